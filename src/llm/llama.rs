//! Backend for a llama.cpp compatible inference server.
//!
//! The server exposes a raw `/completion` endpoint and an OpenAI-style
//! `/v1/chat/completions` endpoint that accepts a JSON schema in
//! `response_format`, which it compiles into a decoding grammar.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChatTurn, GenerationError, SamplingParams, TextGenerator};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    stop: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    schema: &'a Value,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatTurn],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct LlamaServer {
    client: Client,
    base_url: String,
}

impl LlamaServer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, GenerationError> {
        let response = self.client.post(self.endpoint(path)).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(format!("HTTP {}: {}", status, error_text)));
        }

        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl TextGenerator for LlamaServer {
    fn name(&self) -> &str {
        "llama.cpp server"
    }

    async fn complete(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<String, GenerationError> {
        let request = CompletionRequest {
            prompt,
            n_predict: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            stop: &params.stop,
        };
        debug!("POST {} ({} prompt bytes)", self.endpoint("/completion"), prompt.len());

        let response: CompletionResponse = self.post("/completion", &request).await?;
        Ok(response.content)
    }

    async fn chat(
        &self,
        messages: &[ChatTurn],
        params: &SamplingParams,
        schema: Option<&Value>,
    ) -> Result<String, GenerationError> {
        let request = ChatRequest {
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            stop: &params.stop,
            response_format: schema.map(|schema| ResponseFormat {
                kind: "json_object",
                schema,
            }),
        };
        debug!("POST {} ({} messages)", self.endpoint("/v1/chat/completions"), messages.len());

        let response: ChatResponse = self.post("/v1/chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(GenerationError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trailing_slash_is_dropped_from_base_url() {
        let server = LlamaServer::new("http://localhost:8080/", Duration::from_secs(1));
        assert_eq!(server.endpoint("/completion"), "http://localhost:8080/completion");
    }

    #[test]
    fn chat_request_carries_schema_as_json_object_format() {
        let schema = json!({ "type": "object" });
        let messages = vec![ChatTurn::system("sys"), ChatTurn::user("hi")];
        let request = ChatRequest {
            messages: &messages,
            max_tokens: 1024,
            temperature: 0.4,
            top_p: 0.9,
            stop: &[],
            response_format: Some(ResponseFormat {
                kind: "json_object",
                schema: &schema,
            }),
        };

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["response_format"]["schema"], schema);
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn chat_request_without_schema_omits_response_format() {
        let request = ChatRequest {
            messages: &[],
            max_tokens: 10,
            temperature: 0.1,
            top_p: 1.0,
            stop: &[],
            response_format: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn completion_request_maps_max_tokens_to_n_predict() {
        let stop = vec!["<".to_string()];
        let request = CompletionRequest {
            prompt: "p",
            n_predict: 500,
            temperature: 0.2,
            top_p: 0.9,
            stop: &stop,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["n_predict"], 500);
        assert_eq!(body["stop"], json!(["<"]));
    }

    #[test]
    fn chat_response_content_is_read_from_first_choice() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"quizzes\":[]}" } }]
        }))
        .unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("{\"quizzes\":[]}")
        );
    }
}
