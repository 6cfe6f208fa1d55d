//! Events API HTTP client (reqwest-based).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::events::{EventApiClient, EventKind, EventsPage, QueryParams};

/// HTTP client for the upstream provisioning-events API.
///
/// Every event kind is served by its own endpoint URL. Kinds without an
/// endpoint are rejected with a configuration error.
#[derive(Debug, Clone)]
pub struct HttpEventApiClient {
    http_client: Client,
    endpoints: HashMap<EventKind, String>,
    bearer_token: Option<String>,
}

impl HttpEventApiClient {
    /// Create a client with a request timeout.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(http_client))
    }

    /// Create a client with a pre-configured HTTP client (useful for testing).
    #[must_use]
    pub fn with_http_client(http_client: Client) -> Self {
        Self {
            http_client,
            endpoints: HashMap::new(),
            bearer_token: None,
        }
    }

    /// Register the endpoint serving one event kind.
    #[must_use]
    pub fn with_endpoint(mut self, kind: EventKind, url: impl Into<String>) -> Self {
        self.endpoints.insert(kind, url.into());
        self
    }

    /// Authenticate requests with a bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn endpoint(&self, kind: EventKind) -> SyncResult<&str> {
        self.endpoints
            .get(&kind)
            .map(String::as_str)
            .ok_or_else(|| {
                SyncError::configuration(format!("no endpoint configured for {kind} events"))
            })
    }
}

#[async_trait]
impl EventApiClient for HttpEventApiClient {
    async fn fetch_page(
        &self,
        kind: EventKind,
        params: &QueryParams,
    ) -> SyncResult<Option<EventsPage>> {
        let url = self.endpoint(kind)?;
        debug!(event_kind = %kind, url = %url, params = ?params, "Fetching events page");

        let mut builder = self.http_client.get(url).query(params);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            let message = if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body
            };
            return Err(SyncError::event_api(status.as_u16(), message));
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        EventsPage::from_slice(&body)
            .map(Some)
            .map_err(|e| SyncError::decode(format!("invalid events page for {kind}: {e}")))
    }
}
