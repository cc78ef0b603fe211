//! Mock HTTP client for testing.
//!
//! Buffered requests are answered from a table of canned responses. Streaming
//! requests are answered from a queue of scripted connections, each driven
//! from the test through a [`MockStreamHandle`].

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::traits::{ByteStream, Headers, HttpClient, HttpError, Response};

type ChunkSender = mpsc::UnboundedSender<Result<Bytes, HttpError>>;
type ChunkReceiver = mpsc::UnboundedReceiver<Result<Bytes, HttpError>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A recorded HTTP request for verification in tests.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method (GET or POST)
    pub method: String,
    /// Request URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// Request body (for POST requests)
    pub body: Option<String>,
    /// Whether the request asked for a streamed body
    pub streaming: bool,
}

/// Configuration for a buffered mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a response
    Success(Response),
    /// Return an error
    Error(HttpError),
}

/// What the next `get_stream` call will get.
#[derive(Debug)]
enum StreamScript {
    Open(ChunkReceiver),
    Refuse(HttpError),
}

/// Test-side end of a scripted streaming connection.
///
/// Dropping the handle (or calling [`close`](Self::close)) ends the stream,
/// which the reader sees as the server closing the connection.
#[derive(Debug)]
pub struct MockStreamHandle {
    tx: ChunkSender,
}

impl MockStreamHandle {
    /// Push raw bytes to the stream. Returns `false` once the reader is gone.
    pub fn send_raw(&self, chunk: impl Into<Bytes>) -> bool {
        self.tx.send(Ok(chunk.into())).is_ok()
    }

    /// Push a frame on the default channel.
    pub fn send_message(&self, data: &str) -> bool {
        self.send_raw(format!("data: {}\n\n", data))
    }

    /// Push a frame on a named channel.
    pub fn send_event(&self, event: &str, data: &str) -> bool {
        self.send_raw(format!("event: {}\ndata: {}\n\n", event, data))
    }

    /// Fail the stream with a transport error.
    pub fn fail(&self, error: HttpError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// End the stream cleanly.
    pub fn close(self) {}

    /// Whether the reader has dropped its end of the connection.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Mock HTTP client for testing.
///
/// # Example
///
/// ```ignore
/// use paywatch::adapters::mock::{MockHttpClient, MockResponse};
/// use paywatch::traits::{Headers, HttpClient, Response};
///
/// let client = MockHttpClient::new();
/// client.set_response(
///     "http://localhost:8080/api/payment/initialize",
///     MockResponse::Success(Response::new(200, r#"{"orderId":"ORD-1","paymentUrl":"/pay"}"#)),
/// );
///
/// let stream = client.push_stream();
/// stream.send_event("PAYMENT_STATUS", r#"{"orderId":"ORD-1","status":"SUCCESS"}"#);
/// ```
#[derive(Debug, Clone)]
pub struct MockHttpClient {
    /// Configured responses by URL pattern
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    /// Default response when no specific match
    default_response: Arc<Mutex<Option<MockResponse>>>,
    /// Scripted streaming connections, consumed in order
    streams: Arc<Mutex<VecDeque<StreamScript>>>,
    /// Recorded requests for verification
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            default_response: Arc::new(Mutex::new(None)),
            streams: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set a response for a specific URL.
    ///
    /// Exact matches win over prefix matches.
    pub fn set_response(&self, url: &str, response: MockResponse) {
        lock(&self.responses).insert(url.to_string(), response);
    }

    /// Set a default response for URLs without specific matches.
    pub fn set_default_response(&self, response: MockResponse) {
        *lock(&self.default_response) = Some(response);
    }

    /// Queue a streaming connection that opens successfully.
    pub fn push_stream(&self) -> MockStreamHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.streams).push_back(StreamScript::Open(rx));
        MockStreamHandle { tx }
    }

    /// Queue a streaming connection that fails to open.
    pub fn push_stream_error(&self, error: HttpError) {
        lock(&self.streams).push_back(StreamScript::Refuse(error));
    }

    /// Number of scripted connections not yet consumed.
    pub fn pending_streams(&self) -> usize {
        lock(&self.streams).len()
    }

    /// Get all recorded requests.
    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Get recorded streaming requests only.
    pub fn stream_requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.streaming)
            .cloned()
            .collect()
    }

    /// Clear all recorded requests.
    pub fn clear_requests(&self) {
        lock(&self.requests).clear();
    }

    fn record_request(
        &self,
        method: &str,
        url: &str,
        headers: &Headers,
        body: Option<String>,
        streaming: bool,
    ) {
        lock(&self.requests).push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.clone(),
            body,
            streaming,
        });
    }

    fn get_response(&self, url: &str) -> Option<MockResponse> {
        let responses = lock(&self.responses);

        if let Some(response) = responses.get(url) {
            return Some(response.clone());
        }

        let prefix_match = responses
            .iter()
            .filter(|(pattern, _)| url.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, response)| response.clone());
        if prefix_match.is_some() {
            return prefix_match;
        }

        lock(&self.default_response).clone()
    }

    fn respond(&self, url: &str) -> Result<Response, HttpError> {
        match self.get_response(url) {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            None => Err(HttpError::Other(format!("No mock response for URL: {}", url))),
        }
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record_request("GET", url, headers, None, false);
        self.respond(url)
    }

    async fn post(&self, url: &str, body: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record_request("POST", url, headers, Some(body.to_string()), false);
        self.respond(url)
    }

    async fn get_stream(&self, url: &str, headers: &Headers) -> Result<ByteStream, HttpError> {
        self.record_request("GET", url, headers, None, true);

        let script = lock(&self.streams).pop_front();
        match script {
            Some(StreamScript::Open(rx)) => {
                let stream = futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(Box::pin(stream))
            }
            Some(StreamScript::Refuse(err)) => Err(err),
            None => Err(HttpError::ConnectionFailed(format!(
                "No scripted stream for URL: {}",
                url
            ))),
        }
    }
}
