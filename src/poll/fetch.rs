//! Status endpoint fetching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::InstanceConfig;
use crate::error::FetchError;

/// Fetches the raw status document of one instance.
///
/// The poller only sees this trait, so cycles can be driven by something
/// other than HTTP (tests use an in-memory fetcher).
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Fetch the document text of `instance`.
    async fn fetch(&self, instance: &InstanceConfig) -> Result<String, FetchError>;
}

/// HTTP fetcher using basic authentication.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    /// Client that accepts invalid certificates, for `insecure` instances.
    insecure_client: Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        let insecure_client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            insecure_client,
        })
    }
}

#[async_trait]
impl StatusFetcher for HttpFetcher {
    async fn fetch(&self, instance: &InstanceConfig) -> Result<String, FetchError> {
        let client = if instance.insecure {
            &self.insecure_client
        } else {
            &self.client
        };

        let mut request = client.get(&instance.url);
        if let Some((user, password)) = instance.credentials() {
            request = request.basic_auth(user, Some(password));
        }

        debug!(instance = %instance.id, url = %instance.url, "Requesting status");
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        Ok(response.text().await?)
    }
}
