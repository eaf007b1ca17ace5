#![forbid(unsafe_code)]

//! Error taxonomy shared by the harvester binaries.
//!
//! Each variant maps onto one failure policy: configuration problems abort
//! before any network call, fetch errors are fatal for metadata and comments
//! but degrade to empty results for captions, and tool errors are always soft.

use std::path::PathBuf;

use thiserror::Error;

/// Missing or malformed configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("reading {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single request against the remote listing or object endpoints.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {status} {status_text}")]
    Transport { status: u16, status_text: String },
    #[error("unexpected response shape: {0}")]
    Schema(String),
    #[error("network failure: {0}")]
    Network(String),
}

impl FetchError {
    /// Rate limiting, server-side failures, and connection problems.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { status, .. } => *status == 429 || (500..600).contains(status),
            FetchError::Network(_) => true,
            FetchError::Schema(_) => false,
        }
    }
}

/// Failure of the external caption downloader.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unable to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Exit { program: String, status: String },
    #[error("reading caption output in {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for a harvest run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("fetching {what}: {source}")]
    Fetch {
        what: &'static str,
        #[source]
        source: FetchError,
    },
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl HarvestError {
    pub fn fetch(what: &'static str, source: FetchError) -> Self {
        HarvestError::Fetch { what, source }
    }
}
