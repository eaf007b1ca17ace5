#![forbid(unsafe_code)]

//! Cursor-paginated collection engine.
//!
//! A [`Collector`] repeatedly asks a [`PageSource`] for the next page,
//! appends items in fetch order, and stops the first time either the target
//! count is reached or the source stops returning a cursor. The result is
//! truncated to the target so later pages are dropped, never earlier items.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::transport::pause;

/// Ordering requested from the listing endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Relevance,
    Time,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Relevance => "relevance",
            SortOrder::Time => "time",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relevance" => Ok(SortOrder::Relevance),
            "time" => Ok(SortOrder::Time),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// One response unit from a paged listing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    /// Informational only; the platform's count is not authoritative.
    pub total_results: Option<u64>,
}

/// What the collector asks of a source for a single page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub order: SortOrder,
    pub cursor: Option<String>,
}

/// Anything that can serve successive pages given the previous cursor.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page<Self::Item>, FetchError>;
}

/// Bounded retry for transient fetch failures.
///
/// `max_retries == 0` aborts on the first error of any kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    fn should_retry(&self, error: &FetchError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_retries
    }
}

/// A run that stopped on a fetch error. Carries whatever was accumulated
/// before the failure so the caller can decide whether to persist it.
#[derive(Debug)]
pub struct Interrupted<T> {
    pub collected: Vec<T>,
    pub pages_fetched: usize,
    pub error: FetchError,
}

impl<T> fmt::Display for Interrupted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "collection stopped after {} page(s) with {} item(s): {}",
            self.pages_fetched,
            self.collected.len(),
            self.error
        )
    }
}

impl<T: fmt::Debug> std::error::Error for Interrupted<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    CursorExhausted,
}

/// Accumulator owned by a single collector run.
struct CollectionState<T> {
    accumulated: Vec<T>,
    cursor: Option<String>,
    target: usize,
    order: SortOrder,
    pages_fetched: usize,
    exhausted: bool,
}

impl<T> CollectionState<T> {
    fn new(target: usize, order: SortOrder) -> Self {
        Self {
            accumulated: Vec::new(),
            cursor: None,
            target,
            order,
            pages_fetched: 0,
            exhausted: false,
        }
    }

    fn target_reached(&self) -> bool {
        self.accumulated.len() >= self.target
    }

    fn is_done(&self) -> bool {
        self.target_reached() || self.exhausted
    }

    fn request(&self) -> PageRequest {
        PageRequest {
            order: self.order,
            cursor: self.cursor.clone(),
        }
    }

    fn absorb(&mut self, page: Page<T>) {
        self.pages_fetched += 1;
        self.accumulated.extend(page.items);
        self.cursor = page.next_cursor;
        // An empty page with a cursor is not the end of the listing.
        self.exhausted = self.cursor.is_none();
    }

    fn stop_reason(&self) -> StopReason {
        if self.target_reached() {
            StopReason::TargetReached
        } else {
            StopReason::CursorExhausted
        }
    }

    fn finish(mut self) -> Vec<T> {
        self.accumulated.truncate(self.target);
        self.accumulated
    }
}

/// Drives a [`PageSource`] until its termination policy fires.
#[derive(Debug, Clone)]
pub struct Collector {
    page_delay: Duration,
    retry: RetryPolicy,
}

impl Collector {
    pub fn new(page_delay: Duration, retry: RetryPolicy) -> Self {
        Self { page_delay, retry }
    }

    /// Collects up to `target` items. A target of zero performs no fetches.
    pub async fn collect_until<S: PageSource>(
        &self,
        source: &S,
        target: usize,
        order: SortOrder,
    ) -> Result<Vec<S::Item>, Interrupted<S::Item>> {
        let mut state = CollectionState::new(target, order);

        while !state.is_done() {
            if state.pages_fetched > 0 {
                pause(self.page_delay).await;
            }

            let request = state.request();
            let page = match self.fetch_with_retry(source, &request).await {
                Ok(page) => page,
                Err(error) => {
                    tracing::error!(
                        page = state.pages_fetched + 1,
                        accumulated = state.accumulated.len(),
                        %error,
                        "page fetch failed, aborting collection"
                    );
                    return Err(Interrupted {
                        pages_fetched: state.pages_fetched,
                        collected: state.accumulated,
                        error,
                    });
                }
            };

            let page_items = page.items.len();
            let total_hint = page.total_results;
            state.absorb(page);
            tracing::info!(
                page = state.pages_fetched,
                items = page_items,
                accumulated = state.accumulated.len(),
                target = state.target,
                total_results = ?total_hint,
                has_cursor = state.cursor.is_some(),
                "fetched page"
            );
        }

        if state.pages_fetched > 0 {
            tracing::info!(
                pages = state.pages_fetched,
                accumulated = state.accumulated.len(),
                reason = ?state.stop_reason(),
                "collection finished"
            );
        }
        Ok(state.finish())
    }

    async fn fetch_with_retry<S: PageSource>(
        &self,
        source: &S,
        request: &PageRequest,
    ) -> Result<Page<S::Item>, FetchError> {
        let mut attempt = 0;
        loop {
            match source.fetch_page(request).await {
                Ok(page) => return Ok(page),
                Err(error) if self.retry.should_retry(&error, attempt) => {
                    attempt += 1;
                    let delay = self.retry.backoff_for(attempt);
                    tracing::warn!(
                        %error,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "transient page failure, retrying same cursor"
                    );
                    pause(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
