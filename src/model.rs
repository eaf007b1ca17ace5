#![forbid(unsafe_code)]

//! Records produced by a harvest run.
//!
//! All structs here mirror the JSON written to disk. Field names follow the
//! platform's camelCase so snapshots can be compared against raw API dumps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A top-level comment. Author and text are kept exactly as served,
/// markup included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub text: String,
    pub published_at: String,
    pub like_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
    /// Raw first-level replies, passed through untouched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One caption track advertised by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub id: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// `standard`, `asr` (auto-generated) or `forced`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub track_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Caption text keyed by language code.
pub type CaptionContents = BTreeMap<String, String>;

/// Assembled output of one run. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnapshot {
    pub metadata: VideoMetadata,
    pub comments: Vec<Comment>,
    pub caption_tracks: Vec<CaptionTrack>,
    pub caption_contents: CaptionContents,
    pub collected_at: DateTime<Utc>,
}

impl VideoSnapshot {
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            collected_at: self.collected_at,
            counts: SnapshotCounts {
                comments: self.comments.len(),
                caption_tracks: self.caption_tracks.len(),
                caption_languages: self.caption_contents.len(),
            },
            sources: DataSources::default(),
        }
    }
}

/// The `meta` block of the consolidated snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub collected_at: DateTime<Utc>,
    pub counts: SnapshotCounts,
    pub sources: DataSources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCounts {
    pub comments: usize,
    pub caption_tracks: usize,
    pub caption_languages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSources {
    pub metadata: String,
    pub comments: String,
    pub caption_tracks: String,
    pub caption_contents: String,
}

impl Default for DataSources {
    fn default() -> Self {
        Self {
            metadata: "YouTube Data API v3 videos.list".into(),
            comments: "YouTube Data API v3 commentThreads.list".into(),
            caption_tracks: "YouTube Data API v3 captions.list".into(),
            caption_contents: "yt-dlp".into(),
        }
    }
}
