use crate::client::core::ChatClient;
use crate::config::ClientConfig;
use crate::transport::{CsrfTokenSource, HttpTransport, Transport};
use crate::Result;
use std::sync::Arc;

/// Builder for creating clients with custom configuration.
///
/// Keep this surface area small and predictable.
pub struct ChatClientBuilder {
    config: Option<ClientConfig>,
    base_url: Option<String>,
    max_retries: Option<u32>,
    csrf: Option<Arc<dyn CsrfTokenSource>>,
    /// Replace the HTTP transport (primarily for testing)
    transport: Option<Arc<dyn Transport>>,
}

impl ChatClientBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            base_url: None,
            max_retries: None,
            csrf: None,
            transport: None,
        }
    }

    /// Use an explicit configuration. Without one, [`ClientConfig::from_env`] is used.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Source of the `X-CSRFToken` header. Requests go out without it when absent.
    pub fn csrf_source(mut self, source: Arc<dyn CsrfTokenSource>) -> Self {
        self.csrf = Some(source);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<ChatClient> {
        let mut config = self.config.unwrap_or_else(ClientConfig::from_env);
        if let Some(url) = self.base_url {
            config.base_url = url;
        }
        if let Some(n) = self.max_retries {
            config.max_retries = n;
        }
        config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&config, self.csrf)?),
        };

        Ok(ChatClient { config, transport })
    }
}

impl Default for ChatClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
