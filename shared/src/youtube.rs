//! YouTube Data API v3 lookups. Every failure degrades to "no metadata".

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::dto::VideoInfo;
use crate::upstream::{send_once, UpstreamRequest};

static VIDEO_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/)([^&\n?#]+)").expect("valid video id regex")
});

/// Video id of a `youtube.com/watch?v=` or `youtu.be/` link.
pub fn extract_video_id(url: &str) -> Option<&str> {
    VIDEO_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    published_at: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl From<Snippet> for VideoInfo {
    fn from(s: Snippet) -> Self {
        VideoInfo {
            title: s.title,
            description: s.description,
            channel_title: s.channel_title,
            published_at: s.published_at,
            tags: s.tags,
        }
    }
}

pub struct YouTubeClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl YouTubeClient {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            api_key: settings.youtube_key().map(str::to_string),
            endpoint: format!(
                "{}/youtube/v3/videos",
                settings.youtube_api_base.trim_end_matches('/')
            ),
        }
    }

    /// Looks up title, channel, description and tags of the linked video.
    ///
    /// Returns `None` for unrecognised links, a missing API key, quota or
    /// other HTTP errors, and unknown ids.
    pub async fn video_info(&self, video_url: &str) -> Option<VideoInfo> {
        let Some(video_id) = extract_video_id(video_url) else {
            info!(url = %video_url, "no YouTube video id in url");
            return None;
        };
        let Some(key) = self.api_key.as_deref() else {
            warn!("YOUTUBE_API_KEY is not set, skipping video lookup");
            return None;
        };

        let request = UpstreamRequest::get(&self.endpoint)
            .with_query("id", video_id)
            .with_query("part", "snippet,contentDetails")
            .with_query("key", key);
        let body = match send_once(&self.client, &request).await {
            Ok(body) => body,
            Err(e) => {
                warn!(video_id, "YouTube lookup failed: {e}");
                return None;
            }
        };

        let parsed: VideosResponse = match serde_json::from_value(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(video_id, "unexpected YouTube response: {e}");
                return None;
            }
        };
        let info: VideoInfo = parsed.items.into_iter().next()?.snippet.into();
        info!(video_id, title = %info.title, "YouTube metadata found");
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ids_from_both_link_forms() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=4Tr0otuiQuU&t=42"),
            Some("4Tr0otuiQuU")
        );
        assert_eq!(extract_video_id("https://youtu.be/4Tr0otuiQuU?si=x"), Some("4Tr0otuiQuU"));
        assert_eq!(extract_video_id("https://vimeo.com/12345"), None);
        assert_eq!(extract_video_id("not a url"), None);
    }
}
