use crate::client::types::CancelHandle;
use crate::config::ClientConfig;
use crate::transport::{
    CsrfTokenSource, StreamResponse, Transport, TransportError, CSRF_HEADER, SESSION_ID_HEADER,
    TASK_ID_HEADER,
};
use crate::types::payload::StreamRequest;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    csrf: Option<Arc<dyn CsrfTokenSource>>,
    /// Whole-request bound for JSON calls; event streams only get the connect timeout.
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, csrf: Option<Arc<dyn CsrfTokenSource>>) -> Result<Self> {
        let base = url::Url::parse(&config.base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base url: {}", e),
                ErrorContext::new()
                    .with_field_path("config.base_url")
                    .with_source("http_transport"),
            )
        })?;

        let request_timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            csrf,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
        for name in names {
            if let Some(v) = headers.get(*name) {
                if let Ok(s) = v.to_str() {
                    let s = s.trim();
                    if !s.is_empty() {
                        return Some(s.to_string());
                    }
                }
            }
        }
        None
    }

    fn with_csrf(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.csrf.as_ref().and_then(|s| s.token()) {
            Some(token) => req.header(CSRF_HEADER, token),
            None => {
                debug!("no CSRF token available, sending request without it");
                req
            }
        }
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(Error::http(status, error_message_from_body(&body)))
    }

    async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value> {
        let resp = Self::check_status(resp).await?;
        let text = resp.text().await.map_err(TransportError::Http)?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Prefer the server's `{error}` / `{message}` field over the raw body.
fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_stream(
        &self,
        request: &StreamRequest,
        cancel: &CancelHandle,
    ) -> Result<StreamResponse> {
        let url = self.url("chat/stream");
        let req = self
            .with_csrf(self.client.post(&url).json(request))
            .header("accept", "text/event-stream");

        let start = std::time::Instant::now();
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
            r = req.send() => r.map_err(TransportError::Http)?,
        };
        let resp = Self::check_status(resp).await?;

        let session_id = Self::header_first(resp.headers(), &[SESSION_ID_HEADER]);
        let task_id = Self::header_first(resp.headers(), &[TASK_ID_HEADER]);
        info!(
            session_id = session_id.as_deref().unwrap_or(""),
            task_id = task_id.as_deref().unwrap_or(""),
            duration_ms = start.elapsed().as_millis() as u64,
            "event stream opened"
        );

        let body: crate::BoxStream<'static, bytes::Bytes> = Box::pin(
            resp.bytes_stream()
                .map_err(|e| Error::Transport(TransportError::Http(e))),
        );

        Ok(StreamResponse {
            session_id,
            task_id,
            body,
        })
    }

    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let req = self.with_csrf(
            self.client
                .post(self.url(path))
                .timeout(self.request_timeout)
                .json(body),
        );
        let resp = req.send().await.map_err(TransportError::Http)?;
        Self::read_json(resp).await
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(self.url(path))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(TransportError::Http)?;
        Self::read_json(resp).await
    }
}
