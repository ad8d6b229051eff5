use crate::client::credentials::{CredentialProvider, EnvCredential};
use crate::config::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::transport::HttpRemoteClient;
use crate::{Error, ErrorContext, Result};
use reqwest::Proxy;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builder for [`HttpRemoteClient`].
///
/// Per-call timeouts come from the caller; the builder only sets connection-level limits.
/// Environment knobs:
/// - `AI_EDIT_BASE_URL` when no base URL is given
/// - `AI_EDIT_PROXY_URL` to route through a proxy
/// - `AI_EDIT_HTTP_POOL_MAX_IDLE_PER_HOST` (default 8)
pub struct HttpClientBuilder {
    base_url: Option<String>,
    credential: Option<Arc<dyn CredentialProvider>>,
    connect_timeout: Duration,
    max_payload_bytes: usize,
    proxy_url: Option<String>,
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            credential: None,
            connect_timeout: Duration::from_secs(10),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            proxy_url: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Inject a credential provider. Defaults to [`EnvCredential`] for service `ai-edit`.
    pub fn credential(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credential = Some(provider);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<HttpRemoteClient> {
        let raw = self
            .base_url
            .or_else(|| env::var("AI_EDIT_BASE_URL").ok())
            .ok_or_else(|| Error::configuration("base URL is required (set AI_EDIT_BASE_URL)"))?;
        let base_url = normalize_base_url(&raw)?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(
                env::var("AI_EDIT_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(8),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = self
            .proxy_url
            .or_else(|| env::var("AI_EDIT_PROXY_URL").ok())
        {
            let proxy = Proxy::all(&proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy URL: {}", e),
                    ErrorContext::new().with_source("http_client_builder"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            Error::configuration_with_context(
                e.to_string(),
                ErrorContext::new().with_source("http_client_builder"),
            )
        })?;

        let credential = self
            .credential
            .unwrap_or_else(|| Arc::new(EnvCredential::new("ai-edit")));

        Ok(HttpRemoteClient::new(
            client,
            base_url,
            credential,
            self.max_payload_bytes,
        ))
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `raw` and make sure it ends with `/` so endpoint joins append instead of replacing.
fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid base URL '{}': {}", raw, e),
            ErrorContext::new().with_source("http_client_builder"),
        )
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
