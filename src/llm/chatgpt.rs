use std::time::Duration;

use async_trait::async_trait;
use chatgpt::client::ChatGPT;
use chatgpt::config::ChatGPTEngine;
use chatgpt::types::{ChatMessage, CompletionResponse};
use log::debug;
use serde_json::Value;

use super::{ChatTurn, GenerationError, Role, SamplingParams, TextGenerator};

impl From<chatgpt::err::Error> for GenerationError {
    fn from(err: chatgpt::err::Error) -> Self {
        GenerationError::Backend(err.to_string())
    }
}

/// OpenAI chat models through `chatgpt_rs`.
///
/// The OpenAI endpoint used here cannot take a schema, so the schema is
/// appended to the system message and the reply is parsed fail-soft like
/// any other.
pub struct ChatGptBackend {
    api_key: String,
    engine: ChatGPTEngine,
    timeout: Duration,
}

impl ChatGptBackend {
    pub fn new(api_key: String, model: &str, timeout: Duration) -> Self {
        let engine = match model {
            "gpt-4" => ChatGPTEngine::Gpt4,
            _ => ChatGPTEngine::Gpt35Turbo,
        };
        Self {
            api_key,
            engine,
            timeout,
        }
    }

    fn client(&self, params: &SamplingParams) -> Result<ChatGPT, GenerationError> {
        let mut gpt = ChatGPT::new(self.api_key.clone())?;

        gpt.config.engine = self.engine.clone();
        gpt.config.timeout = self.timeout;
        gpt.config.temperature = params.temperature;
        gpt.config.top_p = params.top_p;

        Ok(gpt)
    }
}

fn schema_instruction(schema: &Value) -> String {
    format!(
        "Reply with a single JSON document and nothing else. It must validate against this JSON Schema:\n{}",
        schema
    )
}

/// Splits a `<system>..</system><user>..</user><assistant>` completion prompt
/// into chat turns. A prompt without a user section is sent as one user turn.
fn prompt_turns(prompt: &str) -> Vec<ChatTurn> {
    let section = |tag: &str| {
        let open = format!("<{}>", tag);
        let close = format!("</{}>", tag);
        let start = prompt.find(&open)? + open.len();
        let end = start + prompt[start..].find(&close)?;
        Some(prompt[start..end].trim().to_string())
    };

    match (section("system"), section("user")) {
        (system, Some(user)) => system
            .into_iter()
            .map(ChatTurn::system)
            .chain(std::iter::once(ChatTurn::user(user)))
            .collect(),
        _ => vec![ChatTurn::user(prompt.trim())],
    }
}

fn to_history(messages: &[ChatTurn], schema: Option<&Value>) -> Vec<ChatMessage> {
    let mut history = messages
        .iter()
        .map(|turn| ChatMessage {
            role: match turn.role {
                Role::System => chatgpt::types::Role::System,
                Role::User => chatgpt::types::Role::User,
                Role::Assistant => chatgpt::types::Role::Assistant,
            },
            content: turn.content.clone(),
        })
        .collect::<Vec<_>>();

    if let Some(schema) = schema {
        history.push(ChatMessage {
            role: chatgpt::types::Role::System,
            content: schema_instruction(schema),
        });
    }
    history
}

#[async_trait]
impl TextGenerator for ChatGptBackend {
    fn name(&self) -> &str {
        "chatgpt"
    }

    async fn complete(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<String, GenerationError> {
        let gpt = self.client(params)?;
        let history = to_history(&prompt_turns(prompt), None);

        let response: CompletionResponse = gpt.send_history(&history).await?;
        let content = response.message().clone().content;

        debug!("Completion: {:?}", content);
        Ok(content)
    }

    async fn chat(
        &self,
        messages: &[ChatTurn],
        params: &SamplingParams,
        schema: Option<&Value>,
    ) -> Result<String, GenerationError> {
        let gpt = self.client(params)?;
        let history = to_history(messages, schema);

        let response: CompletionResponse = gpt.send_history(&history).await?;
        let content = response.message().clone().content;

        debug!("Chat completion: {:?}", content);
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_is_appended_as_a_trailing_system_message() {
        let schema = json!({ "required": ["quizzes"] });
        let history = to_history(
            &[ChatTurn::system("tutor"), ChatTurn::user("make a quiz")],
            Some(&schema),
        );

        assert_eq!(history.len(), 3);
        assert_eq!(history[1].content, "make a quiz");
        assert!(history[2].content.contains("\"required\":[\"quizzes\"]"));
    }

    #[test]
    fn completion_prompt_becomes_system_and_user_messages() {
        let turns = prompt_turns(
            "<system>You summarize.</system><user>Summarize this:\nplants</user><assistant>",
        );

        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[0].content, "You summarize.");
        assert_eq!(turns[1].role, Role::User);
        assert_eq!(turns[1].content, "Summarize this:\nplants");

        let history = to_history(&turns, None);
        assert!(history.iter().all(|message| !message.content.contains("<system>")));
    }

    #[test]
    fn untagged_prompt_is_a_single_user_message() {
        let turns = prompt_turns("  just text  ");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "just text");

        let user_only = prompt_turns("<user>question</user><assistant>");
        assert_eq!(user_only.len(), 1);
        assert_eq!(user_only[0].content, "question");
    }

    #[test]
    fn plain_chat_keeps_history_as_is() {
        let history = to_history(&[ChatTurn::user("hello")], None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello");
    }
}
