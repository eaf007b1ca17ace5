#![forbid(unsafe_code)]

//! Caption text retrieval through an external downloader.
//!
//! The downloader is a black box: it gets a fixed flag set and an output
//! directory, and whatever `{video_id}.{lang}.srt` files it deposits there are
//! read back afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::error::ToolError;
use crate::model::CaptionContents;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const CAPTION_EXTENSION: &str = "srt";

#[async_trait]
pub trait CaptionDownloader: Send + Sync {
    async fn download_captions(
        &self,
        video_id: &str,
        output_dir: &Path,
    ) -> Result<CaptionContents, ToolError>;
}

/// Invokes `yt-dlp` for manual and auto-generated captions in SRT.
#[derive(Debug, Clone)]
pub struct YtDlpCaptions {
    pub program: PathBuf,
    pub languages: Vec<String>,
    pub cookies_browser: Option<String>,
    pub user_agent: String,
    pub min_sleep_secs: u32,
    pub max_sleep_secs: u32,
}

impl YtDlpCaptions {
    pub fn new(program: impl Into<PathBuf>, languages: Vec<String>) -> Self {
        Self {
            program: program.into(),
            languages,
            cookies_browser: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            min_sleep_secs: 1,
            max_sleep_secs: 3,
        }
    }

    pub fn with_cookies_from(mut self, browser: impl Into<String>) -> Self {
        let browser = browser.into();
        self.cookies_browser = (!browser.trim().is_empty()).then_some(browser);
        self
    }

    pub fn command_args(&self, video_id: &str, output_dir: &Path) -> Vec<String> {
        let template = output_dir.join("%(id)s.%(ext)s");
        let mut args = vec![
            "--write-subs".to_string(),
            "--write-auto-subs".to_string(),
            "--sub-langs".to_string(),
            self.languages.join(","),
            "--sub-format".to_string(),
            "srt/best".to_string(),
            "--convert-subs".to_string(),
            CAPTION_EXTENSION.to_string(),
            "--skip-download".to_string(),
        ];
        if let Some(browser) = &self.cookies_browser {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.clone());
        }
        args.extend([
            "--user-agent".to_string(),
            self.user_agent.clone(),
            "--sleep-requests".to_string(),
            self.min_sleep_secs.to_string(),
            "--min-sleep-interval".to_string(),
            self.min_sleep_secs.to_string(),
            "--max-sleep-interval".to_string(),
            self.max_sleep_secs.to_string(),
            "--no-progress".to_string(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            format!("https://www.youtube.com/watch?v={video_id}"),
        ]);
        args
    }
}

#[async_trait]
impl CaptionDownloader for YtDlpCaptions {
    async fn download_captions(
        &self,
        video_id: &str,
        output_dir: &Path,
    ) -> Result<CaptionContents, ToolError> {
        let program = self.program.to_string_lossy().into_owned();
        fs::create_dir_all(output_dir).map_err(|source| ToolError::Output {
            path: output_dir.to_path_buf(),
            source,
        })?;
        let stale = clear_caption_files(output_dir, video_id)?;
        if stale > 0 {
            tracing::debug!(files = stale, "removed caption files from an earlier run");
        }

        tracing::info!(%program, %video_id, dir = %output_dir.display(), "downloading captions");
        let status = Command::new(&self.program)
            .args(self.command_args(video_id, output_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        let contents = read_caption_files(output_dir, video_id)?;
        if !status.success() {
            if contents.is_empty() {
                return Err(ToolError::Exit {
                    program,
                    status: status.to_string(),
                });
            }
            tracing::warn!(%program, %status, files = contents.len(), "caption download exited with failure, keeping deposited files");
        }
        Ok(contents)
    }
}

/// Reads every `{video_id}.{lang}.srt` directly inside `dir`.
pub fn read_caption_files(dir: &Path, video_id: &str) -> Result<CaptionContents, ToolError> {
    let mut contents = CaptionContents::new();
    for (lang, path) in caption_files(dir, video_id)? {
        let text = fs::read_to_string(&path).map_err(|source| ToolError::Output { path, source })?;
        contents.insert(lang, text);
    }
    Ok(contents)
}

/// Deletes caption files a previous run left for `video_id`.
pub fn clear_caption_files(dir: &Path, video_id: &str) -> Result<usize, ToolError> {
    let stale = caption_files(dir, video_id)?;
    for (_, path) in &stale {
        fs::remove_file(path).map_err(|source| ToolError::Output {
            path: path.clone(),
            source,
        })?;
    }
    Ok(stale.len())
}

fn caption_files(dir: &Path, video_id: &str) -> Result<Vec<(String, PathBuf)>, ToolError> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    let prefix = format!("{video_id}.");
    let suffix = format!(".{CAPTION_EXTENSION}");

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| ToolError::Output {
            path: dir.to_path_buf(),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let Some(lang) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
            .filter(|lang| !lang.is_empty())
        else {
            continue;
        };
        files.push((lang.to_string(), entry.path().to_path_buf()));
    }
    Ok(files)
}
