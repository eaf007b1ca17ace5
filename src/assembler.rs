#![forbid(unsafe_code)]

//! Orchestrates one harvest run for a single video.
//!
//! Metadata and comments are load-bearing and return `Result`. Caption
//! listing and caption content are enrichments: their methods return plain
//! values and substitute an empty result on failure.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;

use crate::captions::CaptionDownloader;
use crate::collector::{Collector, Interrupted, RetryPolicy, SortOrder};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::model::{CaptionContents, CaptionTrack, Comment, VideoMetadata, VideoSnapshot};
use crate::transport::{Pacing, Transport};
use crate::youtube::DataApi;

/// The slice of configuration the assembler needs.
#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    pub video_id: String,
    pub target_comment_count: usize,
    pub sort_order: SortOrder,
    pub include_replies: bool,
    pub comment_page_size: u32,
    pub caption_dir: PathBuf,
    pub page_delay: Duration,
    pub retry: RetryPolicy,
}

impl AssemblerSettings {
    pub fn from_config(config: &HarvestConfig, pacing: &Pacing, caption_dir: PathBuf) -> Self {
        Self {
            video_id: config.video_id.clone(),
            target_comment_count: config.target_comment_count,
            sort_order: config.sort_order,
            include_replies: config.include_replies,
            comment_page_size: config.comment_page_size,
            caption_dir,
            page_delay: pacing.page_delay,
            retry: config.retry.clone(),
        }
    }
}

pub struct SnapshotAssembler<T, D> {
    api: DataApi<T>,
    downloader: D,
    collector: Collector,
    settings: AssemblerSettings,
}

impl<T: Transport, D: CaptionDownloader> SnapshotAssembler<T, D> {
    pub fn new(api: DataApi<T>, downloader: D, settings: AssemblerSettings) -> Self {
        let collector = Collector::new(settings.page_delay, settings.retry.clone());
        Self {
            api,
            downloader,
            collector,
            settings,
        }
    }

    pub async fn metadata(&self) -> Result<VideoMetadata, HarvestError> {
        let metadata = self
            .api
            .video_metadata(&self.settings.video_id)
            .await
            .map_err(|err| HarvestError::fetch("video metadata", err))?;
        tracing::info!(video_id = %metadata.id, title = %metadata.title, "fetched metadata");
        Ok(metadata)
    }

    /// Runs the comment collector. On failure the partial result is handed
    /// back inside [`Interrupted`].
    pub async fn comments(&self) -> Result<Vec<Comment>, Interrupted<Comment>> {
        let source = self.api.comment_threads(
            &self.settings.video_id,
            self.settings.comment_page_size,
            self.settings.include_replies,
        );
        self.collector
            .collect_until(
                &source,
                self.settings.target_comment_count,
                self.settings.sort_order,
            )
            .await
    }

    pub async fn caption_tracks(&self) -> Vec<CaptionTrack> {
        match self.api.caption_tracks(&self.settings.video_id).await {
            Ok(tracks) => {
                tracing::info!(tracks = tracks.len(), "listed caption tracks");
                tracks
            }
            Err(error) => {
                tracing::warn!(%error, "caption track listing failed, continuing without it");
                Vec::new()
            }
        }
    }

    pub async fn caption_contents(&self) -> CaptionContents {
        match self
            .downloader
            .download_captions(&self.settings.video_id, &self.settings.caption_dir)
            .await
        {
            Ok(contents) => {
                tracing::info!(languages = contents.len(), "read caption files");
                contents
            }
            Err(error) => {
                tracing::warn!(%error, "caption download failed, continuing without it");
                CaptionContents::new()
            }
        }
    }

    /// Full run: metadata, comments, caption list, caption content, in that
    /// order. Any comments gathered before a comment failure are discarded.
    pub async fn assemble(&self) -> Result<VideoSnapshot, HarvestError> {
        let metadata = self.metadata().await?;
        let comments = self.comments().await.map_err(|interrupted| {
            tracing::warn!(
                discarded = interrupted.collected.len(),
                "comment collection failed, discarding partial comments"
            );
            HarvestError::fetch("comments", interrupted.error)
        })?;
        let caption_tracks = self.caption_tracks().await;
        let caption_contents = self.caption_contents().await;

        Ok(VideoSnapshot {
            metadata,
            comments,
            caption_tracks,
            caption_contents,
            collected_at: Utc::now(),
        })
    }

    /// Caption list and content only. Never fails.
    pub async fn captions(&self) -> (Vec<CaptionTrack>, CaptionContents) {
        let tracks = self.caption_tracks().await;
        let contents = self.caption_contents().await;
        (tracks, contents)
    }
}
