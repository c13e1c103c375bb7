//! Types shared across the graph client: decoded events, errors, streams.

use std::fmt;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::Speaker;

/// Standard User-Agent header for triage API requests.
pub const USER_AGENT: &str = concat!("triage/", env!("CARGO_PKG_VERSION"));

/// A decoded event from a graph stream.
///
/// The backend emits four named SSE events. Decoding them into a closed
/// enum means every consumer folds them with one exhaustive match instead
/// of string-keyed handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// Announces (or re-announces) the thread identity for this session.
    Thread { thread_id: String },
    /// An incremental assistant message.
    Message {
        thread_id: String,
        content: String,
        speaker: Option<Speaker>,
    },
    /// The graph is suspended waiting for a user reply. Terminal for the
    /// current connection.
    AskUser {
        thread_id: String,
        speaker: Option<Speaker>,
        /// Explicit question text, emitted by the backend on resume turns.
        question: Option<String>,
    },
    /// The turn loop has completed. Terminal for the current connection.
    Final {
        thread_id: String,
        message: Option<String>,
    },
}

impl GraphEvent {
    /// Whether this event closes the current stream connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GraphEvent::AskUser { .. } | GraphEvent::Final { .. })
    }

    /// The thread id carried by the event.
    pub fn thread_id(&self) -> &str {
        match self {
            GraphEvent::Thread { thread_id }
            | GraphEvent::Message { thread_id, .. }
            | GraphEvent::AskUser { thread_id, .. }
            | GraphEvent::Final { thread_id, .. } => thread_id,
        }
    }
}

/// Error category for graph client failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorKind {
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Request timeout
    Timeout,
    /// Connection failure or a mid-stream transport drop
    Transport,
    /// Failed to decode an event (JSON parse error, unknown event name,
    /// invalid SSE framing)
    Parse,
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientErrorKind::HttpStatus => write!(f, "http_status"),
            ClientErrorKind::Timeout => write!(f, "timeout"),
            ClientErrorKind::Transport => write!(f, "transport"),
            ClientErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured error from the graph client with kind and details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientError {
    /// Error category
    pub kind: ClientErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl ClientError {
    /// Creates a new client error.
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an HTTP status error, extracting a message from a JSON error
    /// body when one is present.
    pub fn http_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}");
        let details = if body.is_empty() {
            None
        } else {
            if let Ok(json) = serde_json::from_str::<Value>(body)
                && let Some(detail) = json.get("detail").and_then(|v| v.as_str())
            {
                return Self {
                    kind: ClientErrorKind::HttpStatus,
                    message: format!("HTTP {status}: {detail}"),
                    details: Some(body.to_string()),
                };
            }
            Some(body.to_string())
        };
        Self {
            kind: ClientErrorKind::HttpStatus,
            message,
            details,
        }
    }

    /// Creates a request timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Timeout, message)
    }

    /// Creates a transport error (connection failure, dropped stream).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Transport, message)
    }

    /// Whether the error is transport-level (as opposed to a decode failure
    /// on a single event). Transport errors end the turn; decode failures
    /// are logged and skipped.
    pub fn is_transport(&self) -> bool {
        !matches!(self.kind, ClientErrorKind::Parse)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ClientError {}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Stream of decoded events from one graph connection.
///
/// Dropping the stream closes the underlying HTTP connection, so a consumer
/// that stops polling after a terminal event never leaks the socket.
pub type GraphStream = BoxStream<'static, ClientResult<GraphEvent>>;

/// Resolves the backend base URL with precedence: env > config > default.
///
/// # Errors
/// Returns an error if an env or config value is not a well-formed URL.
pub fn resolve_base_url(config_base_url: Option<&str>) -> anyhow::Result<String> {
    use anyhow::Context;

    const ENV_VAR: &str = "TRIAGE_BASE_URL";

    if let Ok(env_url) = std::env::var(ENV_VAR) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            url::Url::parse(trimmed)
                .with_context(|| format!("Invalid {ENV_VAR} base URL: {trimmed}"))?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            url::Url::parse(trimmed)
                .with_context(|| format!("Invalid base_url in config: {trimmed}"))?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    Ok(crate::config::DEFAULT_BASE_URL.to_string())
}
