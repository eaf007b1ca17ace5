#![forbid(unsafe_code)]

//! On-disk layout of a harvested video.
//!
//! ```text
//! <output>/<video_id>/
//!   metadata.json
//!   comments.json
//!   caption_tracks.json
//!   captions.json
//!   snapshot.json      # all of the above plus a `meta` block
//!   captions/          # raw downloader output
//! ```
//!
//! Every file is written to a temporary sibling first and renamed into
//! place, so readers never observe a half-written JSON document.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::HarvestError;
use crate::model::{
    CaptionContents, CaptionTrack, Comment, SnapshotSummary, VideoMetadata, VideoSnapshot,
};

pub const METADATA_FILE: &str = "metadata.json";
pub const COMMENTS_FILE: &str = "comments.json";
pub const CAPTION_TRACKS_FILE: &str = "caption_tracks.json";
pub const CAPTIONS_FILE: &str = "captions.json";
pub const SNAPSHOT_FILE: &str = "snapshot.json";
pub const CAPTIONS_SUBDIR: &str = "captions";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsolidatedSnapshot<'a> {
    meta: SnapshotSummary,
    metadata: &'a VideoMetadata,
    comments: &'a [Comment],
    caption_tracks: &'a [CaptionTrack],
    caption_contents: &'a CaptionContents,
}

/// Writes the files of one video directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn create(output_dir: &Path, video_id: &str) -> Result<Self, HarvestError> {
        let dir = output_dir.join(video_id);
        std::fs::create_dir_all(&dir).map_err(|source| HarvestError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the caption downloader is told to deposit its files.
    pub fn caption_dir(&self) -> PathBuf {
        self.dir.join(CAPTIONS_SUBDIR)
    }

    pub fn write_metadata(&self, metadata: &VideoMetadata) -> Result<PathBuf, HarvestError> {
        self.write_json(METADATA_FILE, "metadata", metadata)
    }

    pub fn write_comments(&self, comments: &[Comment]) -> Result<PathBuf, HarvestError> {
        self.write_json(COMMENTS_FILE, "comments", comments)
    }

    pub fn write_caption_tracks(&self, tracks: &[CaptionTrack]) -> Result<PathBuf, HarvestError> {
        self.write_json(CAPTION_TRACKS_FILE, "caption tracks", tracks)
    }

    pub fn write_caption_contents(
        &self,
        contents: &CaptionContents,
    ) -> Result<PathBuf, HarvestError> {
        self.write_json(CAPTIONS_FILE, "caption contents", contents)
    }

    /// Writes the four category files and the consolidated snapshot.
    pub fn write_snapshot(&self, snapshot: &VideoSnapshot) -> Result<PathBuf, HarvestError> {
        self.write_metadata(&snapshot.metadata)?;
        self.write_comments(&snapshot.comments)?;
        self.write_caption_tracks(&snapshot.caption_tracks)?;
        self.write_caption_contents(&snapshot.caption_contents)?;

        let consolidated = ConsolidatedSnapshot {
            meta: snapshot.summary(),
            metadata: &snapshot.metadata,
            comments: &snapshot.comments,
            caption_tracks: &snapshot.caption_tracks,
            caption_contents: &snapshot.caption_contents,
        };
        let path = self.write_json(SNAPSHOT_FILE, "snapshot", &consolidated)?;
        tracing::info!(path = %path.display(), "snapshot written");
        Ok(path)
    }

    /// Opens a comment sink that is flushed however the caller exits.
    pub fn comment_guard(&self) -> CommentFlushGuard<'_> {
        CommentFlushGuard {
            writer: self,
            comments: Vec::new(),
            flushed: false,
        }
    }

    fn write_json<T: Serialize + ?Sized>(
        &self,
        file_name: &str,
        what: &'static str,
        value: &T,
    ) -> Result<PathBuf, HarvestError> {
        let path = self.dir.join(file_name);
        let payload = serde_json::to_vec_pretty(value)
            .map_err(|source| HarvestError::Serialize { what, source })?;
        let io_err = |source: std::io::Error| HarvestError::Io {
            path: path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(&payload).map_err(io_err)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.persist(&path).map_err(|err| io_err(err.error))?;
        tracing::debug!(path = %path.display(), bytes = payload.len(), "wrote {what}");
        Ok(path)
    }
}

/// Holds the comments of a comment-only run and writes them to
/// `comments.json` when dropped, unless [`CommentFlushGuard::finish`] already
/// did.
pub struct CommentFlushGuard<'a> {
    writer: &'a SnapshotWriter,
    comments: Vec<Comment>,
    flushed: bool,
}

impl CommentFlushGuard<'_> {
    pub fn replace(&mut self, comments: Vec<Comment>) {
        self.comments = comments;
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn finish(mut self) -> Result<PathBuf, HarvestError> {
        self.flushed = true;
        self.writer.write_comments(&self.comments)
    }
}

impl Drop for CommentFlushGuard<'_> {
    fn drop(&mut self) {
        if self.flushed {
            return;
        }
        match self.writer.write_comments(&self.comments) {
            Ok(path) => tracing::info!(
                path = %path.display(),
                comments = self.comments.len(),
                "flushed comments on exit"
            ),
            Err(error) => tracing::error!(%error, "could not flush comments on exit"),
        }
    }
}
