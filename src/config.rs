use std::time::Duration;

use crate::quiz::assistant::DEFAULT_QUESTION_COUNT;

/// Upper bound YouTube's `search.list` accepts for `maxResults`.
pub const MAX_SEARCH_RESULTS: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not set")]
    Missing { name: &'static str },
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LlmBackend {
    Llama { server_url: String },
    ChatGpt { api_key: String, model: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub youtube_api_key: Option<String>,
    pub llm: LlmBackend,
    pub transcript_language: String,
    pub quiz_language: String,
    pub quiz_questions: usize,
    pub search_max_results: u32,
    pub inference_timeout: Duration,
    pub database_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source, empty values
    /// counting as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let llm = match var("LLM_BACKEND").as_deref().unwrap_or("llama") {
            "llama" => LlmBackend::Llama {
                server_url: var("LLAMA_SERVER_URL")
                    .unwrap_or_else(|| "http://127.0.0.1:8080".to_string()),
            },
            "chatgpt" => LlmBackend::ChatGpt {
                api_key: var("CHATGPT_API_KEY").ok_or(ConfigError::Missing {
                    name: "CHATGPT_API_KEY",
                })?,
                model: var("CHATGPT_MODEL").unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "LLM_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let quiz_questions =
            parse_number(var("QUIZ_QUESTIONS"), "QUIZ_QUESTIONS", DEFAULT_QUESTION_COUNT)?;
        if quiz_questions == 0 {
            return Err(ConfigError::Invalid {
                name: "QUIZ_QUESTIONS",
                value: "0".to_string(),
            });
        }

        let search_max_results =
            parse_number(var("SEARCH_MAX_RESULTS"), "SEARCH_MAX_RESULTS", 10)?;
        if !(1..=MAX_SEARCH_RESULTS).contains(&search_max_results) {
            return Err(ConfigError::Invalid {
                name: "SEARCH_MAX_RESULTS",
                value: search_max_results.to_string(),
            });
        }

        Ok(Self {
            youtube_api_key: var("YOUTUBE_API_KEY"),
            llm,
            transcript_language: var("TRANSCRIPT_LANGUAGE").unwrap_or_else(|| "ko".to_string()),
            quiz_language: var("QUIZ_LANGUAGE").unwrap_or_else(|| "Korean".to_string()),
            quiz_questions,
            search_max_results,
            inference_timeout: Duration::from_secs(parse_number(
                var("INFERENCE_TIMEOUT_SECS"),
                "INFERENCE_TIMEOUT_SECS",
                120,
            )?),
            database_path: var("DATABASE_PATH").unwrap_or_else(|| "db.sqlite".to_string()),
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    value: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_point_at_a_local_llama_server() {
        let config = config(&[]).unwrap();
        assert_eq!(
            config.llm,
            LlmBackend::Llama {
                server_url: "http://127.0.0.1:8080".to_string()
            }
        );
        assert_eq!(config.youtube_api_key, None);
        assert_eq!(config.transcript_language, "ko");
        assert_eq!(config.quiz_questions, DEFAULT_QUESTION_COUNT);
        assert_eq!(config.search_max_results, 10);
        assert_eq!(config.inference_timeout, Duration::from_secs(120));
        assert_eq!(config.database_path, "db.sqlite");
    }

    #[test]
    fn chatgpt_backend_needs_a_key() {
        assert!(matches!(
            config(&[("LLM_BACKEND", "chatgpt")]),
            Err(ConfigError::Missing { name: "CHATGPT_API_KEY" })
        ));

        let config = config(&[("LLM_BACKEND", "chatgpt"), ("CHATGPT_API_KEY", "sk-test")]).unwrap();
        assert!(matches!(config.llm, LlmBackend::ChatGpt { ref api_key, .. } if api_key == "sk-test"));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            config(&[("LLM_BACKEND", "bard")]),
            Err(ConfigError::Invalid { name: "LLM_BACKEND", .. })
        ));
        assert!(matches!(
            config(&[("QUIZ_QUESTIONS", "five")]),
            Err(ConfigError::Invalid { name: "QUIZ_QUESTIONS", .. })
        ));
        assert!(matches!(
            config(&[("QUIZ_QUESTIONS", "0")]),
            Err(ConfigError::Invalid { name: "QUIZ_QUESTIONS", .. })
        ));
        assert!(matches!(
            config(&[("SEARCH_MAX_RESULTS", "100")]),
            Err(ConfigError::Invalid { name: "SEARCH_MAX_RESULTS", .. })
        ));
        assert!(matches!(
            config(&[("SEARCH_MAX_RESULTS", "0")]),
            Err(ConfigError::Invalid { name: "SEARCH_MAX_RESULTS", .. })
        ));
    }

    #[test]
    fn search_limit_accepts_the_full_api_range() {
        let config = config(&[("SEARCH_MAX_RESULTS", "50")]).unwrap();
        assert_eq!(config.search_max_results, MAX_SEARCH_RESULTS);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config(&[("YOUTUBE_API_KEY", "  "), ("QUIZ_QUESTIONS", "")]).unwrap();
        assert_eq!(config.youtube_api_key, None);
        assert_eq!(config.quiz_questions, 5);
    }
}
