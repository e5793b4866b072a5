use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::llm::{ChatTurn, GenerationError, SamplingParams, TextGenerator};
use crate::quiz::QuizItem;

pub const DEFAULT_QUESTION_COUNT: usize = 5;

const SYSTEM_PROMPT_SUMMARY: &str =
    "You are a professional assistant skilled at summarizing long texts clearly and concisely.";

fn summary_params() -> SamplingParams {
    SamplingParams {
        max_tokens: 500,
        temperature: 0.2,
        top_p: 0.9,
        stop: vec!["<".to_string(), "user>".to_string(), "system>".to_string()],
    }
}

fn quiz_params() -> SamplingParams {
    SamplingParams {
        max_tokens: 1024,
        temperature: 0.4,
        top_p: 0.9,
        stop: Vec::new(),
    }
}

/// Shape the model is forced into when writing a quiz.
pub fn quiz_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "quizzes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "question": { "type": "string" },
                        "options": {
                            "type": "array",
                            "items": { "type": "string" },
                            "minItems": 4,
                            "maxItems": 4
                        },
                        "answer_index": { "type": "integer" },
                        "explanation": { "type": "string" }
                    },
                    "required": ["question", "options", "answer_index", "explanation"]
                },
                "minItems": 1
            }
        },
        "required": ["quizzes"]
    })
}

/// What came back from the model when it was asked for a quiz.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizOutcome {
    Parsed(Vec<QuizItem>),
    /// Valid JSON, but no `quizzes` array in it.
    MissingQuizzes,
    Malformed(String),
}

impl QuizOutcome {
    pub fn into_items(self) -> Vec<QuizItem> {
        match self {
            QuizOutcome::Parsed(items) => items,
            QuizOutcome::MissingQuizzes | QuizOutcome::Malformed(_) => Vec::new(),
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub fn parse_quiz_response(raw: &str) -> QuizOutcome {
    let mut document: Value = match serde_json::from_str(strip_code_fence(raw)) {
        Ok(document) => document,
        Err(err) => return QuizOutcome::Malformed(err.to_string()),
    };

    let quizzes = match document.get_mut("quizzes").map(Value::take) {
        Some(quizzes @ Value::Array(_)) => quizzes,
        _ => return QuizOutcome::MissingQuizzes,
    };

    match serde_json::from_value::<Vec<QuizItem>>(quizzes) {
        Ok(items) => QuizOutcome::Parsed(items),
        Err(err) => QuizOutcome::Malformed(err.to_string()),
    }
}

/// Summaries and quizzes on top of whatever model backend is configured.
pub struct StudyAssistant {
    generator: Arc<dyn TextGenerator>,
    quiz_language: String,
    timeout: Duration,
}

impl StudyAssistant {
    pub fn new(generator: Arc<dyn TextGenerator>, quiz_language: String, timeout: Duration) -> Self {
        Self {
            generator,
            quiz_language,
            timeout,
        }
    }

    pub fn format_summary_prompt(&self, text: &str) -> String {
        let user_request = format!(
            "Below is a text provided by the user.
---
[Text]
{}
---
[Request]
Summarize the core topic and the main points of the text above in 3 concise lines, then state its difficulty level. Answer in {}.",
            text, self.quiz_language
        );
        format!(
            "<system>{}</system><user>{}</user><assistant>",
            SYSTEM_PROMPT_SUMMARY, user_request
        )
    }

    pub fn quiz_system_prompt(&self) -> String {
        format!(
            "You are an AI tutor that creates high-quality multiple-choice quiz questions in {}, based on the given study summary. You must always respond in valid JSON only.",
            self.quiz_language
        )
    }

    pub fn format_quiz_user_prompt(&self, summary: &str, num_questions: usize) -> String {
        format!(
            "Below is a summary of a lecture or video.
---
[Summary]
{}
---
[Request]
Based on the summary above, write {} multiple-choice quiz questions in {}.

Each question must:
- ask about exactly one concept or point
- have exactly 4 options
- have exactly one correct option
- include a short explanation

Output only JSON matching the schema given by the system.",
            summary, num_questions, self.quiz_language
        )
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, GenerationError>>,
    ) -> Result<T, GenerationError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout.as_secs()))?
    }

    /// Short summary plus difficulty level of `text`. Model errors propagate.
    pub async fn summarize(&self, text: &str) -> Result<String, GenerationError> {
        info!(
            "Summarizing {} characters with {}",
            text.chars().count(),
            self.generator.name()
        );
        let prompt = self.format_summary_prompt(text);

        let output = self
            .bounded(self.generator.complete(&prompt, &summary_params()))
            .await?;

        debug!("Summary: {:?}", output);
        Ok(output.trim().to_string())
    }

    /// Asks the model for `num_questions` questions about `summary`.
    ///
    /// Output that does not parse into a quiz yields an empty list; only
    /// failures to reach the model are errors.
    pub async fn generate_quiz(
        &self,
        summary: &str,
        num_questions: usize,
    ) -> Result<Vec<QuizItem>, GenerationError> {
        info!("Generating {} quiz questions", num_questions);
        let messages = [
            ChatTurn::system(self.quiz_system_prompt()),
            ChatTurn::user(self.format_quiz_user_prompt(summary, num_questions)),
        ];
        let schema = quiz_schema();

        let content = self
            .bounded(self.generator.chat(&messages, &quiz_params(), Some(&schema)))
            .await?;
        debug!("Quiz completion: {:?}", content);

        let outcome = parse_quiz_response(&content);
        match &outcome {
            QuizOutcome::Parsed(items) => info!("Model produced {} quiz items", items.len()),
            QuizOutcome::MissingQuizzes => warn!("Quiz response has no `quizzes` array"),
            QuizOutcome::Malformed(reason) => warn!("Quiz response is not valid: {}", reason),
        }
        Ok(outcome.into_items())
    }
}
