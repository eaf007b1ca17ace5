#![forbid(unsafe_code)]

//! Command-line entry point that harvests one video into
//! `<output>/<video_id>/`.
//!
//! Three modes share the same configuration and collaborators:
//! `snapshot` (everything), `comments` (comments only, partial progress is
//! always written), and `captions` (caption list and text only).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use video_harvester::assembler::{AssemblerSettings, SnapshotAssembler};
use video_harvester::captions::{CaptionDownloader, YtDlpCaptions};
use video_harvester::collector::SortOrder;
use video_harvester::config::{ConfigOverrides, resolve_config};
use video_harvester::error::HarvestError;
use video_harvester::logging::init_tracing;
use video_harvester::persist::SnapshotWriter;
use video_harvester::transport::{HttpTransport, Pacing, Transport};
use video_harvester::youtube::DataApi;

#[derive(Debug, Parser)]
#[command(name = "harvest_video", version, about = "Harvest public data about a single video")]
struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,
    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Mode {
    /// Metadata, comments, caption list and caption text (default).
    Snapshot,
    /// Comments only; whatever was collected is written even on failure.
    Comments,
    /// Caption track list and caption text only.
    Captions,
}

#[derive(Debug, Args)]
struct OverrideArgs {
    /// Video identifier (overrides VIDEO_ID).
    #[arg(long, global = true)]
    video_id: Option<String>,
    /// API credential (overrides YOUTUBE_API_KEY).
    #[arg(long, global = true)]
    api_key: Option<String>,
    /// Maximum number of top-level comments (overrides TARGET_COMMENT_COUNT).
    /// Zero or negative collects none.
    #[arg(long, global = true, allow_negative_numbers = true)]
    target: Option<i64>,
    /// `relevance` or `time` (overrides SORT_ORDER).
    #[arg(long, global = true)]
    order: Option<SortOrder>,
    /// Parent directory for the per-video output (overrides OUTPUT_DIR).
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// Request first-level replies with each thread.
    #[arg(long, global = true)]
    replies: bool,
    /// Alternate `.env` file.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

impl OverrideArgs {
    fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            api_key: self.api_key,
            video_id: self.video_id,
            target_comment_count: self.target,
            sort_order: self.order,
            output_dir: self.output_dir,
            include_replies: self.replies.then_some(true),
            env_path: self.env_file,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mode = cli.mode.unwrap_or(Mode::Snapshot);

    let config = resolve_config(cli.overrides.into_overrides()).context("loading configuration")?;
    let writer = SnapshotWriter::create(&config.output_dir, &config.video_id)?;

    let pacing = Pacing::default();
    let api = DataApi::new(HttpTransport::new(pacing.clone()), config.api_key.clone());
    let downloader = YtDlpCaptions::new(&config.yt_dlp_path, config.caption_languages.clone())
        .with_cookies_from(&config.cookies_browser);
    let settings = AssemblerSettings::from_config(&config, &pacing, writer.caption_dir());
    let assembler = SnapshotAssembler::new(api, downloader, settings);

    tracing::info!(
        video_id = %config.video_id,
        mode = ?mode,
        target = config.target_comment_count,
        order = %config.sort_order,
        output = %writer.dir().display(),
        "starting harvest"
    );

    match mode {
        Mode::Snapshot => run_snapshot(&assembler, &writer).await,
        Mode::Comments => run_comments(&assembler, &writer).await,
        Mode::Captions => run_captions(&assembler, &writer).await,
    }
}

async fn run_snapshot<T: Transport, D: CaptionDownloader>(
    assembler: &SnapshotAssembler<T, D>,
    writer: &SnapshotWriter,
) -> Result<()> {
    let snapshot = assembler.assemble().await?;
    let path = writer.write_snapshot(&snapshot)?;
    let summary = snapshot.summary();
    println!("Snapshot: {}", path.display());
    println!("  Comments: {}", summary.counts.comments);
    println!("  Caption tracks: {}", summary.counts.caption_tracks);
    println!("  Caption languages: {}", summary.counts.caption_languages);
    Ok(())
}

async fn run_comments<T: Transport, D: CaptionDownloader>(
    assembler: &SnapshotAssembler<T, D>,
    writer: &SnapshotWriter,
) -> Result<()> {
    let mut guard = writer.comment_guard();
    match assembler.comments().await {
        Ok(comments) => {
            guard.replace(comments);
            let count = guard.len();
            let path = guard.finish()?;
            println!("Comments: {} ({count})", path.display());
            Ok(())
        }
        Err(interrupted) => {
            guard.replace(interrupted.collected);
            let count = guard.len();
            let path = guard.finish()?;
            eprintln!(
                "Warning: comment collection failed, kept {count} comments in {}",
                path.display()
            );
            Err(HarvestError::fetch("comments", interrupted.error).into())
        }
    }
}

async fn run_captions<T: Transport, D: CaptionDownloader>(
    assembler: &SnapshotAssembler<T, D>,
    writer: &SnapshotWriter,
) -> Result<()> {
    let (tracks, contents) = assembler.captions().await;
    writer.write_caption_tracks(&tracks)?;
    let path = writer.write_caption_contents(&contents)?;
    println!("Captions: {}", path.display());
    println!("  Caption tracks: {}", tracks.len());
    println!("  Caption languages: {}", contents.len());
    Ok(())
}
