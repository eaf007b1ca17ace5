#![forbid(unsafe_code)]

//! In-memory doubles shared by unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::captions::CaptionDownloader;
use crate::error::{FetchError, ToolError};
use crate::model::CaptionContents;
use crate::transport::Transport;

type Call = (String, Vec<(&'static str, String)>);

/// Transport that answers from per-resource queues keyed by the last path
/// segment of the endpoint. An empty queue answers 404.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, FetchError>>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeTransport {
    pub fn respond(&self, resource: &str, response: Result<Value, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(resource.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, resource: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(endpoint, _)| endpoint.rsplit('/').next() == Some(resource))
            .count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get_json(
        &self,
        endpoint: &str,
        query: &[(&'static str, String)],
    ) -> Result<Value, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), query.to_vec()));
        let resource = endpoint.rsplit('/').next().unwrap_or_default();
        self.responses
            .lock()
            .unwrap()
            .get_mut(resource)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(FetchError::Transport {
                    status: 404,
                    status_text: "Not Found".into(),
                })
            })
    }
}

/// Downloader returning a canned result.
pub struct FakeDownloader {
    pub result: Mutex<Option<Result<CaptionContents, ToolError>>>,
}

impl FakeDownloader {
    pub fn returning(contents: &[(&str, &str)]) -> Self {
        let map: BTreeMap<String, String> = contents
            .iter()
            .map(|(lang, text)| (lang.to_string(), text.to_string()))
            .collect();
        Self {
            result: Mutex::new(Some(Ok(map))),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Mutex::new(Some(Err(ToolError::Exit {
                program: "yt-dlp".into(),
                status: "exit status: 1".into(),
            }))),
        }
    }
}

#[async_trait]
impl CaptionDownloader for FakeDownloader {
    async fn download_captions(
        &self,
        _video_id: &str,
        _output_dir: &Path,
    ) -> Result<CaptionContents, ToolError> {
        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(CaptionContents::new()))
    }
}
