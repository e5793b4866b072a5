use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::quiz::QuizItem;
use crate::ranking::RankedVideo;

/// Rows a fresh checklist starts with.
pub const DEFAULT_CHECKLIST_ROWS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedVideo {
    pub video: RankedVideo,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub quiz_items: Vec<QuizItem>,
    /// Summary `quiz_items` were generated from.
    #[serde(default)]
    pub quiz_source_summary: Option<String>,
}

impl SelectedVideo {
    pub fn new(video: RankedVideo) -> Self {
        Self {
            video,
            transcript: None,
            summary: None,
            quiz_items: Vec::new(),
            quiz_source_summary: None,
        }
    }

    /// The last generated quiz, as long as the summary has not changed since.
    pub fn cached_quiz(&self) -> Option<&[QuizItem]> {
        let summary = self.summary.as_ref()?;
        let fresh = self.quiz_source_summary.as_ref() == Some(summary);
        (fresh && !self.quiz_items.is_empty()).then_some(self.quiz_items.as_slice())
    }

    pub fn remember_quiz(&mut self, summary: &str, items: Vec<QuizItem>) {
        self.quiz_source_summary = Some(summary.to_string());
        self.quiz_items = items;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    AlreadySaved,
    NothingSelected,
}

/// Everything the bot remembers about one student between messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    pub selected: Option<SelectedVideo>,
    pub saved_videos: Vec<RankedVideo>,
    pub memo: String,
    /// Keyed by ISO date (`YYYY-MM-DD`).
    pub checklists: BTreeMap<String, Vec<ChecklistItem>>,
}

impl StudySession {
    /// Selecting a video drops the transcript and summary of the previous one.
    pub fn select_video(&mut self, video: RankedVideo) {
        self.selected = Some(SelectedVideo::new(video));
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn save_selected(&mut self) -> SaveOutcome {
        let Some(selected) = &self.selected else {
            return SaveOutcome::NothingSelected;
        };
        let video_id = &selected.video.video.video_id;

        if self
            .saved_videos
            .iter()
            .any(|saved| &saved.video.video_id == video_id)
        {
            return SaveOutcome::AlreadySaved;
        }
        self.saved_videos.push(selected.video.clone());
        SaveOutcome::Saved
    }

    pub fn open_saved(&mut self, idx: usize) -> bool {
        match self.saved_videos.get(idx).cloned() {
            Some(video) => {
                self.select_video(video);
                true
            }
            None => false,
        }
    }

    pub fn remove_saved(&mut self, idx: usize) -> Option<RankedVideo> {
        (idx < self.saved_videos.len()).then(|| self.saved_videos.remove(idx))
    }

    pub fn set_memo(&mut self, memo: &str) {
        self.memo = memo.to_string();
    }

    /// The memo as a UTF-8 text file, or `None` while it is blank.
    pub fn memo_export(&self) -> Option<Vec<u8>> {
        if self.memo.trim().is_empty() {
            return None;
        }
        Some(self.memo.as_bytes().to_vec())
    }

    pub fn checklist(&mut self, date: NaiveDate) -> &mut Vec<ChecklistItem> {
        self.checklists
            .entry(date.format("%Y-%m-%d").to_string())
            .or_insert_with(|| vec![ChecklistItem::default(); DEFAULT_CHECKLIST_ROWS])
    }

    /// Fills the first blank row, or appends a new one when all are used.
    pub fn add_checklist_item(&mut self, date: NaiveDate, text: &str) {
        let rows = self.checklist(date);
        let item = ChecklistItem {
            text: text.trim().to_string(),
            done: false,
        };
        match rows.iter().position(|row| row.text.is_empty()) {
            Some(idx) => rows[idx] = item,
            None => rows.push(item),
        }
    }

    /// Flips the done flag of row `idx`, returning the new state.
    pub fn toggle_checklist_item(&mut self, date: NaiveDate, idx: usize) -> Option<bool> {
        let row = self.checklist(date).get_mut(idx)?;
        row.done = !row.done;
        Some(row.done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::VideoCandidate;

    fn video(id: &str) -> RankedVideo {
        RankedVideo {
            video: VideoCandidate {
                video_id: id.to_string(),
                title: format!("Video {}", id),
                ..Default::default()
            },
            score: 1.0,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn selecting_resets_derived_data() {
        let mut session = StudySession::default();
        session.select_video(video("a"));
        if let Some(selected) = session.selected.as_mut() {
            selected.transcript = Some("[ko] ...".to_string());
            selected.summary = Some("summary".to_string());
        }

        session.select_video(video("b"));
        let selected = session.selected.as_ref().unwrap();
        assert_eq!(selected.video.video.video_id, "b");
        assert!(selected.transcript.is_none());
        assert!(selected.summary.is_none());
    }

    #[test]
    fn quiz_cache_follows_the_summary() {
        let mut selected = SelectedVideo::new(video("a"));
        assert!(selected.cached_quiz().is_none());

        selected.summary = Some("first summary".to_string());
        selected.remember_quiz("first summary", vec![QuizItem::default()]);
        assert_eq!(selected.cached_quiz().map(|items| items.len()), Some(1));

        selected.summary = Some("second summary".to_string());
        assert!(selected.cached_quiz().is_none());

        selected.remember_quiz("second summary", Vec::new());
        assert!(selected.cached_quiz().is_none());
    }

    #[test]
    fn saving_twice_is_reported() {
        let mut session = StudySession::default();
        assert_eq!(session.save_selected(), SaveOutcome::NothingSelected);

        session.select_video(video("a"));
        assert_eq!(session.save_selected(), SaveOutcome::Saved);
        assert_eq!(session.save_selected(), SaveOutcome::AlreadySaved);
        assert_eq!(session.saved_videos.len(), 1);
    }

    #[test]
    fn saved_videos_open_and_delete_by_index() {
        let mut session = StudySession::default();
        session.saved_videos = vec![video("a"), video("b")];

        assert!(session.open_saved(1));
        assert_eq!(session.selected.as_ref().unwrap().video.video.video_id, "b");
        assert!(!session.open_saved(5));

        assert_eq!(session.remove_saved(0).unwrap().video.video_id, "a");
        assert!(session.remove_saved(3).is_none());
        assert_eq!(session.saved_videos.len(), 1);
    }

    #[test]
    fn blank_memo_has_nothing_to_export() {
        let mut session = StudySession::default();
        session.set_memo("   \n");
        assert!(session.memo_export().is_none());

        session.set_memo("Review the Calvin cycle");
        assert_eq!(session.memo_export().unwrap(), b"Review the Calvin cycle".to_vec());
    }

    #[test]
    fn checklist_starts_with_default_rows_and_fills_them_first() {
        let mut session = StudySession::default();
        assert_eq!(session.checklist(day()).len(), DEFAULT_CHECKLIST_ROWS);

        for task in ["read chapter 3", "watch lecture", "solve problems", "flashcards"] {
            session.add_checklist_item(day(), task);
        }
        let rows = session.checklist(day());
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].text, "read chapter 3");
        assert_eq!(rows[3].text, "flashcards");
        assert!(session.checklists.contains_key("2025-03-14"));
    }

    #[test]
    fn checklist_rows_toggle() {
        let mut session = StudySession::default();
        session.add_checklist_item(day(), "read chapter 3");
        assert_eq!(session.toggle_checklist_item(day(), 0), Some(true));
        assert_eq!(session.toggle_checklist_item(day(), 0), Some(false));
        assert_eq!(session.toggle_checklist_item(day(), 10), None);
    }

    #[test]
    fn session_survives_a_json_round_trip() {
        let mut session = StudySession::default();
        session.select_video(video("a"));
        session.add_checklist_item(day(), "task");

        let json = serde_json::to_string(&session).unwrap();
        let restored: StudySession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, session);
    }
}
