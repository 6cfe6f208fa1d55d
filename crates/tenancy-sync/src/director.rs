//! Write side: the director GraphQL API that applies tenant changes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::model::TenantWriteInput;

const WRITE_TENANTS_MUTATION: &str =
    "mutation ($in: [BusinessTenantMappingInput!]!) { writeTenants(in: $in) }";
const DELETE_TENANTS_MUTATION: &str =
    "mutation ($in: [BusinessTenantMappingInput!]!) { deleteTenants(in: $in) }";
const UPDATE_TENANT_MUTATION: &str =
    "mutation ($id: ID!, $in: BusinessTenantMappingInput!) { updateTenant(id: $id, in: $in) { id } }";

/// Applies tenant changes to the platform of record.
///
/// Every operation is idempotent on the external tenant ID.
#[async_trait]
pub trait DirectorWriteClient: Send + Sync {
    async fn write_tenants(&self, tenants: &[TenantWriteInput]) -> SyncResult<()>;
    async fn delete_tenants(&self, tenants: &[TenantWriteInput]) -> SyncResult<()>;
    async fn update_tenant(&self, id: &str, tenant: &TenantWriteInput) -> SyncResult<()>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// GraphQL client for the director API.
#[derive(Debug, Clone)]
pub struct HttpDirectorClient {
    endpoint: String,
    http_client: Client,
    bearer_token: Option<String>,
}

impl HttpDirectorClient {
    /// Create a client with a request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(endpoint, http_client))
    }

    /// Create a client with a pre-configured HTTP client (useful for testing).
    pub fn with_http_client(endpoint: impl Into<String>, http_client: Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http_client,
            bearer_token: None,
        }
    }

    /// Authenticate requests with a bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    async fn execute(&self, operation: &str, query: &str, variables: Value) -> SyncResult<()> {
        debug!(operation, endpoint = %self.endpoint, "Sending director mutation");

        let mut builder = self
            .http_client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(SyncError::director(format!(
                "{operation} failed with HTTP {status}: {body}"
            )));
        }

        let parsed: GraphQlResponse = serde_json::from_str(&body).map_err(|e| {
            SyncError::director(format!("{operation} returned an unreadable response: {e}"))
        })?;
        if !parsed.errors.is_empty() {
            let messages: Vec<String> = parsed.errors.into_iter().map(|e| e.message).collect();
            return Err(SyncError::director(format!(
                "{operation} failed: {}",
                messages.join("; ")
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectorWriteClient for HttpDirectorClient {
    async fn write_tenants(&self, tenants: &[TenantWriteInput]) -> SyncResult<()> {
        self.execute("writeTenants", WRITE_TENANTS_MUTATION, json!({ "in": tenants }))
            .await
    }

    async fn delete_tenants(&self, tenants: &[TenantWriteInput]) -> SyncResult<()> {
        self.execute("deleteTenants", DELETE_TENANTS_MUTATION, json!({ "in": tenants }))
            .await
    }

    async fn update_tenant(&self, id: &str, tenant: &TenantWriteInput) -> SyncResult<()> {
        self.execute(
            "updateTenant",
            UPDATE_TENANT_MUTATION,
            json!({ "id": id, "in": tenant }),
        )
        .await
    }
}
