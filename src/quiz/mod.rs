pub mod assistant;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `answer_index` of an item whose answer could not be read.
pub const UNKNOWN_ANSWER: i64 = -1;

/// One multiple-choice question as produced by the model.
///
/// Kept exactly as parsed: `answer_index` may point outside `options`, and
/// `options` may not have four entries. Use [`QuizItem::correct_option`]
/// instead of indexing directly. Loosely typed fields are coerced rather than
/// rejected, so one odd item never sinks the rest of the quiz.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizItem {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub question: String,
    #[serde(default, deserialize_with = "deserialize_options")]
    pub options: Vec<String>,
    #[serde(default = "unknown_answer", deserialize_with = "deserialize_answer_index")]
    pub answer_index: i64,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub explanation: String,
}

fn unknown_answer() -> i64 {
    UNKNOWN_ANSWER
}

fn text_of(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_of(Value::deserialize(deserializer)?))
}

fn deserialize_options<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(options) => options.into_iter().map(text_of).collect(),
        _ => Vec::new(),
    })
}

/// Integers pass through; anything else marks the answer as unknown.
fn deserialize_answer_index<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?
        .as_i64()
        .unwrap_or(UNKNOWN_ANSWER))
}

impl QuizItem {
    pub fn correct_index(&self) -> Option<usize> {
        usize::try_from(self.answer_index)
            .ok()
            .filter(|idx| *idx < self.options.len())
    }

    pub fn correct_option(&self) -> Option<&str> {
        self.correct_index().map(|idx| self.options[idx].as_str())
    }

    pub fn labelled_options(&self) -> Vec<String> {
        self.options
            .iter()
            .enumerate()
            .map(|(idx, option)| format!("{}. {}", option_letter(idx), option))
            .collect()
    }
}

pub fn option_letter(idx: usize) -> char {
    (b'A' + (idx % 26) as u8) as char
}

/// Maps a reply like "B", "b" or "B. Chlorophyll" back to an option index.
pub fn parse_choice(reply: &str, option_count: usize) -> Option<usize> {
    let first = reply.trim().chars().next()?.to_ascii_uppercase();
    if !first.is_ascii_uppercase() {
        return None;
    }
    let idx = (first as u8 - b'A') as usize;
    (idx < option_count).then_some(idx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect { correct_index: usize },
    UnknownAnswer,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizRun {
    pub items: Vec<QuizItem>,
    pub current_question: usize,
    pub score: u32,
    /// The summary the quiz was generated from.
    pub source_summary: String,
}

impl QuizRun {
    pub fn new(items: Vec<QuizItem>, source_summary: String) -> Self {
        Self {
            items,
            current_question: 0,
            score: 0,
            source_summary,
        }
    }

    pub fn current(&self) -> Option<&QuizItem> {
        self.items.get(self.current_question)
    }

    pub fn is_finished(&self) -> bool {
        self.current_question >= self.items.len()
    }

    /// Grades `choice` against the current question and moves on.
    pub fn answer(&mut self, choice: usize) -> Option<Verdict> {
        let item = self.current()?;
        let verdict = match item.correct_index() {
            Some(correct) if correct == choice => Verdict::Correct,
            Some(correct) => Verdict::Incorrect {
                correct_index: correct,
            },
            None => Verdict::UnknownAnswer,
        };

        if verdict == Verdict::Correct {
            self.score += 1;
        }
        self.current_question += 1;
        Some(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(answer_index: i64) -> QuizItem {
        QuizItem {
            question: "Where does photosynthesis happen?".to_string(),
            options: vec![
                "Chloroplast".to_string(),
                "Nucleus".to_string(),
                "Ribosome".to_string(),
                "Vacuole".to_string(),
            ],
            answer_index,
            explanation: "Chloroplasts hold chlorophyll.".to_string(),
        }
    }

    #[test]
    fn out_of_range_answer_is_unknown() {
        assert_eq!(item(0).correct_option(), Some("Chloroplast"));
        assert_eq!(item(4).correct_option(), None);
        assert_eq!(item(-1).correct_option(), None);
    }

    #[test]
    fn options_are_lettered() {
        assert_eq!(
            item(0).labelled_options(),
            vec!["A. Chloroplast", "B. Nucleus", "C. Ribosome", "D. Vacuole"]
        );
    }

    #[test]
    fn choices_parse_from_letters_and_labels() {
        assert_eq!(parse_choice("A", 4), Some(0));
        assert_eq!(parse_choice("c", 4), Some(2));
        assert_eq!(parse_choice("D. Vacuole", 4), Some(3));
        assert_eq!(parse_choice("E", 4), None);
        assert_eq!(parse_choice("", 4), None);
        assert_eq!(parse_choice("3", 4), None);
    }

    #[test]
    fn run_keeps_score_and_handles_unknown_answers() {
        let mut run = QuizRun::new(vec![item(0), item(2), item(9)], "summary".to_string());

        assert_eq!(run.answer(0), Some(Verdict::Correct));
        assert_eq!(
            run.answer(1),
            Some(Verdict::Incorrect { correct_index: 2 })
        );
        assert_eq!(run.answer(0), Some(Verdict::UnknownAnswer));
        assert!(run.is_finished());
        assert_eq!(run.answer(0), None);
        assert_eq!(run.score, 1);
    }

    #[test]
    fn missing_fields_default_when_deserializing() {
        let parsed: QuizItem = serde_json::from_str(r#"{"question":"Q?"}"#).unwrap();
        assert_eq!(parsed.question, "Q?");
        assert!(parsed.options.is_empty());
        assert_eq!(parsed.answer_index, UNKNOWN_ANSWER);
        assert_eq!(parsed.correct_option(), None);
    }

    #[test]
    fn loosely_typed_fields_are_coerced() {
        let parsed: QuizItem = serde_json::from_str(
            r#"{"question": 12, "options": ["a", 2, null, true], "answer_index": "1", "explanation": null}"#,
        )
        .unwrap();
        assert_eq!(parsed.question, "12");
        assert_eq!(parsed.options, vec!["a", "2", "", "true"]);
        assert_eq!(parsed.answer_index, UNKNOWN_ANSWER);
        assert_eq!(parsed.explanation, "");

        let fractional: QuizItem = serde_json::from_str(r#"{"answer_index": 1.5}"#).unwrap();
        assert_eq!(fractional.answer_index, UNKNOWN_ANSWER);

        let not_a_list: QuizItem = serde_json::from_str(r#"{"options": "A or B"}"#).unwrap();
        assert!(not_a_list.options.is_empty());
    }
}
