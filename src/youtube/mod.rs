pub mod json3;
pub mod ytdlp;

use crate::error::{CoachError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use url::Url;

pub use ytdlp::YtDlpSource;

/// Video metadata reported by the downloader
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub author: String,
    /// Duration in seconds
    pub duration: u64,
    pub upload_date: Option<String>,
    pub description: String,
    pub tags: Vec<String>,
    pub url: String,
    pub video_id: String,
}

impl VideoMetadata {
    /// Placeholder metadata used when the downloader cannot describe a video
    pub fn unknown(url: &str) -> Self {
        Self {
            title: "Unknown".to_string(),
            author: "Unknown".to_string(),
            duration: 0,
            upload_date: None,
            description: String::new(),
            tags: Vec::new(),
            url: url.to_string(),
            video_id: String::new(),
        }
    }

    /// Duration as `Mm Ss`
    pub fn duration_label(&self) -> String {
        format!("{}m {}s", self.duration / 60, self.duration % 60)
    }
}

/// Where transcripts and video metadata come from
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Metadata for a video; falls back to [`VideoMetadata::unknown`]
    async fn metadata(&self, url: &str) -> VideoMetadata;

    /// Transcript text, or `None` when nothing usable is available
    async fn transcript(&self, url: &str) -> Result<Option<String>>;
}

fn video_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}").expect("valid video id regex"))
}

/// Extract the 11-character video id from the usual YouTube URL shapes:
/// `watch?v=`, `youtu.be/`, `/embed/` and `/shorts/`.
pub fn extract_video_id(url: &str) -> Result<String> {
    let invalid = || CoachError::InvalidUrl(url.to_string());

    let parsed = Url::parse(url)
        .or_else(|_| Url::parse(&format!("https://{}", url)))
        .map_err(|_| invalid())?;
    let host = parsed.host_str().ok_or_else(invalid)?.to_lowercase();

    let candidate = if host == "youtu.be" {
        parsed.path_segments().and_then(|mut s| s.next()).map(str::to_string)
    } else if host == "youtube.com" || host.ends_with(".youtube.com") {
        let mut segments = parsed.path_segments().into_iter().flatten();
        match segments.next() {
            Some("watch") => parsed
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("embed") | Some("shorts") => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        None
    };

    candidate
        .as_deref()
        .and_then(|c| video_id_pattern().find(c))
        .map(|m| m.as_str().to_string())
        .ok_or_else(invalid)
}
