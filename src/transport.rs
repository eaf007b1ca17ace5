#![forbid(unsafe_code)]

//! Rate-limited HTTP GET transport.
//!
//! Every request waits a randomized delay before it is issued. This is a
//! self-imposed rate limit and does not react to server feedback. Retries are
//! not handled here.

use std::ops::RangeInclusive;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::FetchError;

pub const DEFAULT_REQUEST_DELAY_MS: RangeInclusive<u64> = 800..=1000;
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(500);

/// The two pacing layers: per-request jitter and the collector's fixed delay
/// between pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacing {
    pub request_delay_ms: RangeInclusive<u64>,
    pub page_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            request_delay_ms: 0..=0,
            page_delay: Duration::ZERO,
        }
    }

    pub fn request_delay(&self) -> Duration {
        let (low, high) = (*self.request_delay_ms.start(), *self.request_delay_ms.end());
        if high <= low {
            return Duration::from_millis(low);
        }
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}

pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues one GET and returns the decoded JSON body of a 2xx response.
    async fn get_json(
        &self,
        endpoint: &str,
        query: &[(&'static str, String)],
    ) -> Result<Value, FetchError>;
}

/// Fetches and decodes into `T`, reporting shape mismatches as schema errors.
pub async fn fetch_typed<T, R>(
    transport: &R,
    endpoint: &str,
    query: &[(&'static str, String)],
) -> Result<T, FetchError>
where
    T: DeserializeOwned,
    R: Transport + ?Sized,
{
    let body = transport.get_json(endpoint, query).await?;
    serde_json::from_value(body).map_err(|err| FetchError::Schema(err.to_string()))
}

/// `ureq`-backed transport. Blocking calls run on tokio's blocking pool so
/// the calling task is suspended, not the runtime.
#[derive(Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    pacing: Pacing,
}

impl HttpTransport {
    pub fn new(pacing: Pacing) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(concat!("video-harvester/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent, pacing }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(
        &self,
        endpoint: &str,
        query: &[(&'static str, String)],
    ) -> Result<Value, FetchError> {
        pause(self.pacing.request_delay()).await;

        let agent = self.agent.clone();
        let endpoint = endpoint.to_string();
        let query = query.to_vec();
        tracing::debug!(%endpoint, params = query.len(), "GET");

        tokio::task::spawn_blocking(move || blocking_get(&agent, &endpoint, &query))
            .await
            .map_err(|err| FetchError::Network(format!("request task failed: {err}")))?
    }
}

fn blocking_get(
    agent: &ureq::Agent,
    endpoint: &str,
    query: &[(&'static str, String)],
) -> Result<Value, FetchError> {
    let mut request = agent.get(endpoint);
    for (key, value) in query {
        request = request.query(key, value);
    }
    match request.call() {
        Ok(response) => response
            .into_json::<Value>()
            .map_err(|err| FetchError::Schema(format!("body is not JSON: {err}"))),
        Err(ureq::Error::Status(status, response)) => Err(FetchError::Transport {
            status,
            status_text: response.status_text().to_string(),
        }),
        Err(ureq::Error::Transport(err)) => Err(FetchError::Network(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Answers exactly one request with the given status line and body and
    /// reports the request line it saw.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                if header == "\r\n" || header.is_empty() {
                    break;
                }
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            tx.send(request_line.trim_end().to_string()).unwrap();
        });
        (format!("http://{addr}/commentThreads"), rx)
    }

    fn query() -> Vec<(&'static str, String)> {
        vec![
            ("part", "snippet".to_string()),
            ("pageToken", "abc".to_string()),
        ]
    }

    #[tokio::test]
    async fn success_returns_json_and_sends_query() {
        let (url, seen) = serve_once("200 OK", r#"{"items":[],"nextPageToken":"n"}"#);
        let transport = HttpTransport::new(Pacing::none());
        let body = transport.get_json(&url, &query()).await.unwrap();
        assert_eq!(body["nextPageToken"], "n");
        let request_line = seen.recv().unwrap();
        assert!(request_line.starts_with("GET /commentThreads?"));
        assert!(request_line.contains("part=snippet"));
        assert!(request_line.contains("pageToken=abc"));
    }

    #[tokio::test]
    async fn non_success_status_maps_to_transport_error() {
        let (url, _seen) = serve_once("403 Forbidden", r#"{"error":{"code":403}}"#);
        let transport = HttpTransport::new(Pacing::none());
        let err = transport.get_json(&url, &query()).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Transport {
                status: 403,
                status_text: "Forbidden".into()
            }
        );
    }

    #[tokio::test]
    async fn malformed_body_maps_to_schema_error() {
        let (url, _seen) = serve_once("200 OK", "not json");
        let transport = HttpTransport::new(Pacing::none());
        let err = transport.get_json(&url, &query()).await.unwrap_err();
        assert!(matches!(err, FetchError::Schema(_)));
    }

    #[tokio::test]
    async fn fetch_typed_reports_shape_mismatch() {
        #[derive(Debug, Deserialize)]
        struct Expected {
            #[allow(dead_code)]
            items: Vec<String>,
        }

        let (url, _seen) = serve_once("200 OK", r#"{"items":"nope"}"#);
        let transport = HttpTransport::new(Pacing::none());
        let err = fetch_typed::<Expected, _>(&transport, &url, &query())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Schema(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn request_waits_randomized_delay_before_sending() {
        let (url, seen) = serve_once("200 OK", r#"{"items":[]}"#);
        let transport = HttpTransport::new(Pacing::default());
        let start = tokio::time::Instant::now();
        transport.get_json(&url, &query()).await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(800), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(1000), "waited {waited:?}");
        assert!(seen.recv().unwrap().starts_with("GET /commentThreads?"));
    }

    #[tokio::test(start_paused = true)]
    async fn unpaced_transport_does_not_wait() {
        let (url, _seen) = serve_once("200 OK", r#"{"items":[]}"#);
        let transport = HttpTransport::new(Pacing::none());
        let start = tokio::time::Instant::now();
        transport.get_json(&url, &query()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn request_delay_stays_within_bounds() {
        let pacing = Pacing::default();
        for _ in 0..50 {
            let delay = pacing.request_delay();
            assert!(delay >= Duration::from_millis(800));
            assert!(delay <= Duration::from_millis(1000));
        }
        assert_eq!(Pacing::none().request_delay(), Duration::ZERO);
    }
}
