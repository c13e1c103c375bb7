//! Graph backend client.
//!
//! One streaming GET per conversation turn: `start` opens a new thread,
//! `resume` continues a suspended one. Both return the same kind of
//! decoded event stream; the session layer owns what the events mean.

pub mod shared;
pub mod sse;

use futures_util::StreamExt;
use tracing::debug;

pub use shared::{
    ClientError, ClientErrorKind, ClientResult, GraphEvent, GraphStream, resolve_base_url,
};
use sse::SseParser;

/// HTTP client for the graph streaming endpoints.
pub struct GraphClient {
    base_url: String,
    http: reqwest::Client,
}

impl GraphClient {
    /// Creates a client against the given backend origin.
    ///
    /// `base_url` must not have a trailing slash (`resolve_base_url`
    /// normalizes this).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Opens a start stream for a new thread carrying the user's text.
    ///
    /// # Errors
    /// Returns an error on connection failure or a non-2xx response.
    pub async fn start_stream(&self, message: &str) -> ClientResult<GraphStream> {
        let url = start_url(&self.base_url, message);
        debug!(target: "triage::client", "opening start stream");
        self.open_stream(&url).await
    }

    /// Opens a resume stream carrying the user's reply to a pending ask.
    ///
    /// # Errors
    /// Returns an error on connection failure or a non-2xx response
    /// (e.g., HTTP 404 when the thread has expired server-side).
    pub async fn resume_stream(&self, thread_id: &str, reply: &str) -> ClientResult<GraphStream> {
        let url = resume_url(&self.base_url, thread_id, reply);
        debug!(target: "triage::client", %thread_id, "opening resume stream");
        self.open_stream(&url).await
    }

    async fn open_stream(&self, url: &str) -> ClientResult<GraphStream> {
        let response = self
            .http
            .get(url)
            .header("accept", "text/event-stream")
            .header("user-agent", shared::USER_AGENT)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ClientError::http_status(status.as_u16(), &error_body));
        }

        Ok(SseParser::new(response.bytes_stream()).boxed())
    }
}

/// Builds the start endpoint URL with the user text as a query parameter.
fn start_url(base_url: &str, message: &str) -> String {
    format!(
        "{base_url}/api/graph/start/stream?message={}",
        urlencoding::encode(message)
    )
}

/// Builds the resume endpoint URL carrying the thread id and reply.
fn resume_url(base_url: &str, thread_id: &str, reply: &str) -> String {
    format!(
        "{base_url}/api/graph/resume/stream?thread_id={}&user_reply={}",
        urlencoding::encode(thread_id),
        urlencoding::encode(reply)
    )
}

fn classify_reqwest_error(e: &reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ClientError::transport(format!("Connection failed: {e}"))
    } else {
        ClientError::transport(format!("Network error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_url_percent_encodes_message() {
        let url = start_url("http://localhost:8000", "I have a headache");
        assert_eq!(
            url,
            "http://localhost:8000/api/graph/start/stream?message=I%20have%20a%20headache"
        );
    }

    #[test]
    fn resume_url_percent_encodes_reply() {
        let url = resume_url("http://localhost:8000", "abc", "Throbbing, behind the eyes");
        assert_eq!(
            url,
            "http://localhost:8000/api/graph/resume/stream?thread_id=abc&user_reply=Throbbing%2C%20behind%20the%20eyes"
        );
    }

    #[test]
    fn urls_are_relative_to_resolved_base() {
        let url = start_url("https://triage.example.com/proxy", "hi");
        assert_eq!(
            url,
            "https://triage.example.com/proxy/api/graph/start/stream?message=hi"
        );
    }
}
