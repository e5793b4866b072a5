//! Captions through `yt-transcript-rs`.
//!
//! The crate lists the caption tracks of a video and fetches one of them
//! with markup stripped and entities decoded. Track choice stays here.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use yt_transcript_rs::api::YouTubeTranscriptApi;
use yt_transcript_rs::{FetchedTranscript, TranscriptList};

use super::extract_video_id;

#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("transcript provider failed: {0}")]
    Provider(String),
    #[error("no captions are available for video {0}")]
    NoCaptions(String),
}

fn provider_error(err: impl std::fmt::Display) -> TranscriptError {
    TranscriptError::Provider(err.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

impl TranscriptSegment {
    /// Collapses whitespace; segments left empty are dropped.
    fn cleaned(text: &str, start: f64, duration: f64) -> Option<Self> {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (!text.is_empty()).then_some(Self {
            text,
            start,
            duration,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub language_code: String,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// All segments joined by spaces, prefixed by the language code,
    /// e.g. `[ko] ...`.
    pub fn plain_text(&self) -> String {
        let text = self
            .segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        format!("[{}] {}", self.language_code, text)
    }
}

impl From<FetchedTranscript> for Transcript {
    fn from(fetched: FetchedTranscript) -> Self {
        let segments = fetched
            .snippets
            .iter()
            .filter_map(|snippet| {
                TranscriptSegment::cleaned(&snippet.text, snippet.start, snippet.duration)
            })
            .collect();
        Self {
            language_code: fetched.language_code,
            segments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrack {
    pub language_code: String,
    /// Auto-generated (ASR) captions.
    pub generated: bool,
}

fn sorted_tracks<'a>(codes: impl IntoIterator<Item = &'a String>, generated: bool) -> Vec<CaptionTrack> {
    let mut codes = codes.into_iter().collect::<Vec<_>>();
    codes.sort();
    codes
        .into_iter()
        .map(|code| CaptionTrack {
            language_code: code.clone(),
            generated,
        })
        .collect()
}

/// Manual tracks first, then generated ones, each ordered by language code.
pub fn tracks_from_codes<'a>(
    manual: impl IntoIterator<Item = &'a String>,
    generated: impl IntoIterator<Item = &'a String>,
) -> Vec<CaptionTrack> {
    let mut tracks = sorted_tracks(manual, false);
    tracks.extend(sorted_tracks(generated, true));
    tracks
}

fn available_tracks(list: &TranscriptList) -> Vec<CaptionTrack> {
    tracks_from_codes(
        list.manually_created_transcripts.keys(),
        list.generated_transcripts.keys(),
    )
}

/// Manual captions in `language` first, then generated ones in `language`,
/// then whatever track comes first.
pub fn select_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    let in_language = |track: &&CaptionTrack| track.language_code == language;

    tracks
        .iter()
        .filter(in_language)
        .find(|track| !track.generated)
        .or_else(|| tracks.iter().find(in_language))
        .or_else(|| tracks.first())
}

pub struct TranscriptFetcher {
    api: YouTubeTranscriptApi,
}

impl TranscriptFetcher {
    pub fn new() -> Result<Self, TranscriptError> {
        let api = YouTubeTranscriptApi::new(None, None, None).map_err(provider_error)?;
        Ok(Self { api })
    }

    /// Fetches the transcript of `video_id_or_url`, preferring `language`
    /// and falling back to the first available track.
    pub async fn fetch(
        &self,
        video_id_or_url: &str,
        language: &str,
    ) -> Result<Transcript, TranscriptError> {
        let video_id = extract_video_id(video_id_or_url);
        info!("Fetching transcript for {} (preferred language: {})", video_id, language);

        let list = self
            .api
            .list_transcripts(&video_id)
            .await
            .map_err(provider_error)?;
        let tracks = available_tracks(&list);
        let track = select_track(&tracks, language)
            .ok_or_else(|| TranscriptError::NoCaptions(video_id.clone()))?;
        debug!(
            "Using {} caption track ({} available)",
            track.language_code,
            tracks.len()
        );

        let fetched = self
            .api
            .fetch_transcript(&video_id, &[track.language_code.as_str()], false)
            .await
            .map_err(provider_error)?;

        let transcript = Transcript::from(fetched);
        if transcript.segments.is_empty() {
            return Err(TranscriptError::NoCaptions(video_id));
        }
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|code| code.to_string()).collect()
    }

    fn track(language: &str, generated: bool) -> CaptionTrack {
        CaptionTrack {
            language_code: language.to_string(),
            generated,
        }
    }

    #[test]
    fn listed_tracks_put_manual_captions_first() {
        let manual = codes(&["ko", "en"]);
        let generated = codes(&["ja", "ko"]);

        let tracks = tracks_from_codes(&manual, &generated);
        assert_eq!(
            tracks,
            vec![
                track("en", false),
                track("ko", false),
                track("ja", true),
                track("ko", true),
            ]
        );
    }

    #[test]
    fn preferred_language_wins_and_manual_beats_generated() {
        let manual = codes(&["en", "ko"]);
        let generated = codes(&["ko"]);
        let tracks = tracks_from_codes(&manual, &generated);

        let chosen = select_track(&tracks, "ko").unwrap();
        assert_eq!(chosen, &track("ko", false));
    }

    #[test]
    fn generated_track_in_language_beats_other_languages() {
        let manual = codes(&["en"]);
        let generated = codes(&["ko"]);
        let tracks = tracks_from_codes(&manual, &generated);

        assert_eq!(select_track(&tracks, "ko").unwrap(), &track("ko", true));
    }

    #[test]
    fn falls_back_to_first_listed_track() {
        let manual = codes(&["ja"]);
        let generated = codes(&["en"]);
        let tracks = tracks_from_codes(&manual, &generated);

        assert_eq!(select_track(&tracks, "ko").unwrap().language_code, "ja");
        assert!(select_track(&[], "ko").is_none());
    }

    #[test]
    fn snippets_are_cleaned_and_blank_ones_dropped() {
        let segment = TranscriptSegment::cleaned("  it's\ngreen  ", 2.6, 1.9).unwrap();
        assert_eq!(segment.text, "it's green");
        assert_eq!(segment.start, 2.6);
        assert_eq!(segment.duration, 1.9);

        assert!(TranscriptSegment::cleaned(" \n ", 4.5, 1.0).is_none());
    }

    #[test]
    fn plain_text_is_prefixed_with_language() {
        let transcript = Transcript {
            language_code: "ko".to_string(),
            segments: vec![
                TranscriptSegment {
                    text: "안녕하세요".to_string(),
                    start: 0.0,
                    duration: 1.0,
                },
                TranscriptSegment {
                    text: "광합성".to_string(),
                    start: 1.0,
                    duration: 1.0,
                },
            ],
        };
        assert_eq!(transcript.plain_text(), "[ko] 안녕하세요 광합성");
    }
}
