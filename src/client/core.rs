use crate::client::events::SessionSink;
use crate::client::poller::TaskPoller;
use crate::client::policy::RetryPolicy;
use crate::client::session::StreamSession;
use crate::config::ClientConfig;
use crate::transport::Transport;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Entry point: owns configuration and transport, hands out sessions and pollers.
///
/// Cheap to clone; sessions created from one client share its transport but
/// nothing else.
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Arc<dyn Transport>,
}

impl ChatClient {
    /// Build a client from configuration with the default HTTP transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        crate::client::builder::ChatClientBuilder::new()
            .config(config)
            .build()
    }

    pub fn builder() -> crate::client::builder::ChatClientBuilder {
        crate::client::builder::ChatClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config)
    }

    /// Start a new conversation.
    pub fn session(&self, sink: Arc<dyn SessionSink>) -> StreamSession {
        StreamSession::new(self.transport.clone(), self.retry_policy(), sink)
            .with_idle_timeout(self.config.stream_idle_timeout())
    }

    /// Continue a conversation whose id was persisted by the caller.
    pub fn resume_session(
        &self,
        session_id: impl Into<String>,
        sink: Arc<dyn SessionSink>,
    ) -> StreamSession {
        self.session(sink).with_session_id(session_id)
    }

    pub fn poller(&self) -> TaskPoller {
        TaskPoller::new(self.transport.clone()).with_interval(self.config.poll_interval())
    }

    /// Wait for a background task; `None` uses the configured task timeout.
    pub async fn wait_for_task(
        &self,
        task_id: &str,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        let timeout = timeout.unwrap_or_else(|| self.config.task_timeout());
        self.poller().wait_for_task(task_id, timeout).await
    }
}
