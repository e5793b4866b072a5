use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const VIEWS_WEIGHT: f64 = 1.0;
const LIKE_RATIO_WEIGHT: f64 = 1.0;
const COMMENTS_WEIGHT: f64 = 0.5;
const KEYWORD_WEIGHT: f64 = 1.0;
// like / view lands in 0..1 for real videos, scale it up so it can compete with the log terms
const LIKE_RATIO_SCALE: f64 = 10.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub view_count: u64,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub like_count: u64,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub comment_count: u64,
}

impl VideoCandidate {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedVideo {
    #[serde(flatten)]
    pub video: VideoCandidate,
    pub score: f64,
}

/// Turns a loosely typed statistic into a count.
///
/// YouTube sends statistics as decimal strings, and some videos hide them
/// entirely. Negative numbers clamp to zero, anything unparseable is zero.
pub fn coerce_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => {
            if let Some(n) = n.as_u64() {
                n
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f > 0.0 {
                    f as u64
                } else {
                    0
                }
            } else {
                0
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<u64>() {
                n
            } else if let Ok(f) = s.parse::<f64>() {
                if f.is_finite() && f > 0.0 {
                    f as u64
                } else {
                    0
                }
            } else {
                0
            }
        }
        _ => 0,
    }
}

pub fn deserialize_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_count(&value))
}

pub fn score(query: &str, candidate: &VideoCandidate) -> f64 {
    let views = candidate.view_count as f64;

    let s_views = (views + 1.0).log10();

    let like_ratio = if candidate.view_count > 0 {
        candidate.like_count as f64 / views
    } else {
        0.0
    };
    let s_like = like_ratio * LIKE_RATIO_SCALE;

    let s_comments = (candidate.comment_count as f64 + 1.0).log10();

    let s_keyword = keyword_bonus(query, candidate);

    VIEWS_WEIGHT * s_views
        + LIKE_RATIO_WEIGHT * s_like
        + COMMENTS_WEIGHT * s_comments
        + KEYWORD_WEIGHT * s_keyword
}

fn keyword_bonus(query: &str, candidate: &VideoCandidate) -> f64 {
    let query = query.to_lowercase();
    if query.is_empty() {
        return 0.0;
    }

    let mut bonus = 0.0;
    if candidate.title.to_lowercase().contains(&query) {
        bonus += 1.0;
    }
    if candidate.description.to_lowercase().contains(&query) {
        bonus += 1.0;
    }
    bonus
}

/// Scores every candidate and sorts them best first.
///
/// `sort_by` is stable, so candidates with equal scores keep the order the
/// search provider returned them in.
pub fn rank(query: &str, candidates: Vec<VideoCandidate>) -> Vec<RankedVideo> {
    let mut ranked = candidates
        .into_iter()
        .map(|video| {
            let score = score(query, &video);
            RankedVideo { video, score }
        })
        .collect::<Vec<_>>();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}
