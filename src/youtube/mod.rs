pub mod transcript;

use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::ranking::{self, coerce_count, RankedVideo, VideoCandidate};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, thiserror::Error)]
pub enum YouTubeError {
    #[error("YOUTUBE_API_KEY is not set")]
    MissingApiKey,
    #[error("YouTube request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("YouTube API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    #[serde(default)]
    id: String,
    #[serde(default)]
    snippet: Snippet,
    #[serde(default)]
    statistics: Statistics,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    channel_title: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    thumbnails: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    #[serde(default)]
    view_count: Value,
    #[serde(default)]
    like_count: Value,
    #[serde(default)]
    comment_count: Value,
}

impl From<VideoItem> for VideoCandidate {
    fn from(item: VideoItem) -> Self {
        let thumbnail = item
            .snippet
            .thumbnails
            .pointer("/default/url")
            .and_then(Value::as_str)
            .map(str::to_string);

        VideoCandidate {
            video_id: item.id,
            title: item.snippet.title.unwrap_or_default(),
            description: item.snippet.description.unwrap_or_default(),
            channel_title: item.snippet.channel_title.unwrap_or_default(),
            thumbnail,
            published_at: item.snippet.published_at,
            view_count: coerce_count(&item.statistics.view_count),
            like_count: coerce_count(&item.statistics.like_count),
            comment_count: coerce_count(&item.statistics.comment_count),
        }
    }
}

/// Client for the YouTube Data API v3.
#[derive(Clone)]
pub struct YouTubeClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            base_url: API_BASE.to_string(),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, YouTubeError> {
        let api_key = self.api_key.as_deref().ok_or(YouTubeError::MissingApiKey)?;

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .query(query)
            .query(&[("key", api_key)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(YouTubeError::Api { status, message });
        }

        Ok(response.json::<T>().await?)
    }

    /// Searches videos for `query`, fetches their statistics, and returns
    /// them ranked by [`ranking::rank`].
    pub async fn search_videos(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<RankedVideo>, YouTubeError> {
        info!("Searching YouTube for {:?}", query);
        let max_results = max_results.to_string();

        let search: SearchResponse = self
            .get(
                "search",
                &[
                    ("q", query),
                    ("part", "snippet"),
                    ("type", "video"),
                    ("maxResults", max_results.as_str()),
                    ("order", "relevance"),
                ],
            )
            .await?;

        let video_ids = search
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect::<Vec<_>>();
        if video_ids.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Fetching statistics for {} videos", video_ids.len());

        let ids = video_ids.join(",");
        let videos: VideosResponse = self
            .get("videos", &[("part", "snippet,statistics"), ("id", ids.as_str())])
            .await?;

        let candidates = videos
            .items
            .into_iter()
            .map(VideoCandidate::from)
            .collect::<Vec<_>>();

        Ok(ranking::rank(query, candidates))
    }
}

/// Accepts a bare video id or any of the usual YouTube URL forms.
pub fn extract_video_id(video_id_or_url: &str) -> String {
    let s = video_id_or_url.trim();

    if let Ok(url) = url::Url::parse(s) {
        let host = url.host_str().unwrap_or_default();

        if host.ends_with("youtu.be") {
            return url.path().trim_start_matches('/').to_string();
        }

        if host.ends_with("youtube.com") {
            if let Some((_, v)) = url.query_pairs().find(|(key, _)| key == "v") {
                return v.into_owned();
            }
            if let Some(id) = url
                .path()
                .strip_prefix("/embed/")
                .or_else(|| url.path().strip_prefix("/shorts/"))
            {
                return id.to_string();
            }
        }
    }

    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn video_ids_come_out_of_urls() {
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(extract_video_id("  dQw4w9WgXcQ "), "dQw4w9WgXcQ");
    }

    #[test]
    fn video_item_maps_to_candidate() {
        let item: VideoItem = serde_json::from_value(json!({
            "id": "abc123",
            "snippet": {
                "title": "Photosynthesis basics",
                "description": "Light reactions",
                "channelTitle": "Bio Class",
                "publishedAt": "2024-03-01T00:00:00Z",
                "thumbnails": { "default": { "url": "https://i.ytimg.com/vi/abc123/default.jpg" } }
            },
            "statistics": { "viewCount": "1000", "likeCount": "100" }
        }))
        .unwrap();

        let candidate = VideoCandidate::from(item);
        assert_eq!(candidate.video_id, "abc123");
        assert_eq!(candidate.channel_title, "Bio Class");
        assert_eq!(
            candidate.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/abc123/default.jpg")
        );
        assert_eq!(candidate.view_count, 1000);
        assert_eq!(candidate.like_count, 100);
        // hidden comment count
        assert_eq!(candidate.comment_count, 0);
    }

    #[test]
    fn search_items_without_video_ids_are_skipped() {
        let search: SearchResponse = serde_json::from_value(json!({
            "items": [
                { "id": { "kind": "youtube#video", "videoId": "a" } },
                { "id": { "kind": "youtube#channel", "channelId": "c" } }
            ]
        }))
        .unwrap();
        let ids = search
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn search_without_api_key_fails_early() {
        let client = YouTubeClient::new(None);
        let result = client.search_videos("photosynthesis", 10).await;
        assert!(matches!(result, Err(YouTubeError::MissingApiKey)));
    }
}
