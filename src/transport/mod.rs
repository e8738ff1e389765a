//! 传输层：事件流请求与 JSON 请求的 HTTP 抽象。
//!
//! Transport layer.
//!
//! [`Transport`] is the seam between the streaming core and the network. The
//! production implementation is [`HttpTransport`] (reqwest); tests substitute
//! an in-memory double.

pub mod http;

pub use http::HttpTransport;

use crate::client::types::CancelHandle;
use crate::types::payload::StreamRequest;
use crate::{BoxStream, Result};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Response header carrying the server-assigned conversation id.
pub const SESSION_ID_HEADER: &str = "X-Session-ID";
/// Response header carrying a background task id.
pub const TASK_ID_HEADER: &str = "X-Task-ID";
/// Request header carrying the CSRF token on modifying requests.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Low-level transport failures.
///
/// The display text is chosen so that timeouts read as "timeout" and every
/// other connection problem reads as "network": the error classifier relies on it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{}", describe_reqwest(.0))]
    Http(#[from] reqwest::Error),

    #[error("network stream closed before completion")]
    Incomplete,

    #[error("network read timeout after {0}ms")]
    ReadTimeout(u64),

    #[error("transport cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Other(String),
}

fn describe_reqwest(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timeout: {}", e)
    } else {
        format!("network error: {}", e)
    }
}

/// An opened event stream plus the headers the session cares about.
pub struct StreamResponse {
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub body: BoxStream<'static, Bytes>,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("session_id", &self.session_id)
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

/// Network operations consumed by sessions and pollers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open `POST /chat/stream`. Must give up with [`TransportError::Cancelled`]
    /// if `cancel` fires before the response headers arrive.
    async fn open_stream(
        &self,
        request: &StreamRequest,
        cancel: &CancelHandle,
    ) -> Result<StreamResponse>;

    /// `POST <base><path>` with a JSON body, returning the decoded JSON body.
    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value>;

    /// `GET <base><path>`, returning the decoded JSON body.
    async fn get_json(&self, path: &str) -> Result<serde_json::Value>;
}

/// Opaque provider of the CSRF token attached to modifying requests.
pub trait CsrfTokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token, e.g. read once from a cookie jar at startup.
#[derive(Debug, Clone)]
pub struct StaticCsrfToken(pub String);

impl CsrfTokenSource for StaticCsrfToken {
    fn token(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}
