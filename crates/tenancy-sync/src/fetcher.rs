//! Fetching of decoded records for one sync window.
//!
//! Each fetch is one retried page walk per client. A region may be served by
//! the universal client (with a region query parameter), by a dedicated
//! regional client, or both; the universal client wins on overlap.
//!
//! Single-entity lookups ask the universal client first and fall back to the
//! regional clients, in region name order.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PagingConfig, QueryConfig, RegionConfig, SyncJobConfig};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventApiClient, EventDecoder, EventKind, PageWalker, QueryParams};
use crate::hierarchy;
use crate::model::{MoveRecord, TenantRecord};
use crate::retry::RetryPolicy;

/// Fetches and decodes events through the configured clients.
pub struct EventFetcher {
    universal: Arc<dyn EventApiClient>,
    regional: BTreeMap<String, Arc<dyn EventApiClient>>,
    decoder: EventDecoder,
    query: QueryConfig,
    paging: PagingConfig,
    retry: RetryPolicy,
}

impl EventFetcher {
    pub fn new(
        universal: Arc<dyn EventApiClient>,
        decoder: EventDecoder,
        query: QueryConfig,
        paging: PagingConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            universal,
            regional: BTreeMap::new(),
            decoder,
            query,
            paging,
            retry,
        }
    }

    /// Build a fetcher whose decoding, paging and retry follow a job config.
    pub fn for_job(config: &SyncJobConfig, universal: Arc<dyn EventApiClient>) -> Self {
        let decoder = EventDecoder::new(
            config.fields.clone(),
            config.moved_fields.clone(),
            config.paging.events_field.clone(),
            config.provider.clone(),
        );
        Self::new(
            universal,
            decoder,
            config.query.clone(),
            config.paging.clone(),
            config.retry.policy(),
        )
    }

    /// Register a dedicated client for one region.
    #[must_use]
    pub fn with_regional_client(
        mut self,
        region: impl Into<String>,
        client: Arc<dyn EventApiClient>,
    ) -> Self {
        self.regional.insert(region.into(), client);
        self
    }

    /// Fetch tenant records of one kind changed since `window_start`.
    ///
    /// `region` is `None` for the global-account job.
    pub async fn fetch_tenants(
        &self,
        kind: EventKind,
        region: Option<&RegionConfig>,
        window_start: i64,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<TenantRecord>> {
        let mut tenants = Vec::new();

        if region.map_or(true, |r| r.universal_client_enabled) {
            let params = self.window_params(region, window_start);
            tenants = self
                .walk_tenants(self.universal.as_ref(), kind, params, cancel)
                .await?;
        }

        if let Some((name, client)) = self.regional_client(region) {
            let params = self.window_params(None, window_start);
            let regional = self.walk_tenants(client, kind, params, cancel).await?;
            let regional = hierarchy::exclude(regional, &tenants);
            debug!(region = %name, event_kind = %kind, count = regional.len(), "Merged regional events");
            tenants.extend(regional);
        }

        info!(
            event_kind = %kind,
            region = region.map_or("", |r| r.name.as_str()),
            count = tenants.len(),
            "Fetched tenant events"
        );
        Ok(tenants)
    }

    /// Fetch move records since `window_start`.
    pub async fn fetch_moves(
        &self,
        region: Option<&RegionConfig>,
        window_start: i64,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<MoveRecord>> {
        let mut moves = Vec::new();

        if region.map_or(true, |r| r.universal_client_enabled) {
            let params = self.window_params(region, window_start);
            moves = self
                .walk_moves(self.universal.as_ref(), params, cancel)
                .await?;
        }

        if let Some((_, client)) = self.regional_client(region) {
            let params = self.window_params(None, window_start);
            let regional: Vec<MoveRecord> = self
                .walk_moves(client, params, cancel)
                .await?
                .into_iter()
                .filter(|m| !moves_contain(&moves, &m.subaccount_id))
                .collect();
            moves.extend(regional);
        }

        info!(
            region = region.map_or("", |r| r.name.as_str()),
            count = moves.len(),
            "Fetched moved subaccount events"
        );
        Ok(moves)
    }

    /// Fetch records of one kind for a single entity, regardless of time.
    ///
    /// When the universal client has no record of the entity, each regional
    /// client is asked until one has. A failing regional client is logged and
    /// counts as not having the entity.
    pub async fn fetch_by_entity(
        &self,
        kind: EventKind,
        entity_id: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<TenantRecord>> {
        let mut params = self.page_params();
        params.insert(self.query.entity_field.clone(), entity_id.to_string());

        let tenants = self
            .walk_tenants(self.universal.as_ref(), kind, params.clone(), cancel)
            .await?;
        if contains_entity(&tenants, entity_id) {
            debug!(tenant_id = %entity_id, "Tenant found with the universal client");
            return Ok(tenants);
        }

        for (region, client) in &self.regional {
            match self
                .walk_tenants(client.as_ref(), kind, params.clone(), cancel)
                .await
            {
                Ok(regional) if contains_entity(&regional, entity_id) => {
                    info!(tenant_id = %entity_id, region = %region, "Tenant found with a regional client");
                    return Ok(regional);
                }
                Ok(_) => {
                    debug!(tenant_id = %entity_id, region = %region, "Tenant not found in region");
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    warn!(
                        tenant_id = %entity_id,
                        region = %region,
                        error = %e,
                        "Failed to fetch tenant from region"
                    );
                }
            }
        }

        Ok(tenants)
    }

    fn regional_client<'a>(
        &'a self,
        region: Option<&'a RegionConfig>,
    ) -> Option<(&'a str, &'a dyn EventApiClient)> {
        let region = region?;
        self.regional
            .get(&region.name)
            .map(|client| (region.name.as_str(), client.as_ref()))
    }

    fn page_params(&self) -> QueryParams {
        QueryParams::from([
            (
                self.query.page_num_field.clone(),
                self.query.page_start_value.clone(),
            ),
            (
                self.query.page_size_field.clone(),
                self.query.page_size_value.clone(),
            ),
        ])
    }

    fn window_params(&self, region: Option<&RegionConfig>, window_start: i64) -> QueryParams {
        let mut params = self.page_params();
        params.insert(self.query.timestamp_field.clone(), window_start.to_string());
        if let Some(region) = region {
            params.insert(self.query.region_field.clone(), region.name.clone());
        }
        params
    }

    async fn walk_tenants(
        &self,
        client: &dyn EventApiClient,
        kind: EventKind,
        params: QueryParams,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<TenantRecord>> {
        let operation = format!("fetch {kind} events");
        let params = &params;
        self.retry
            .execute(&operation, cancel, || async move {
                let walker = PageWalker::new(client, &self.paging, &self.query.page_num_field);
                let mut tenants = Vec::new();
                walker
                    .walk(kind, params.clone(), cancel, |page| {
                        tenants.extend(self.decoder.decode_tenants(page, kind));
                    })
                    .await?;
                Ok(tenants)
            })
            .await
    }

    async fn walk_moves(
        &self,
        client: &dyn EventApiClient,
        params: QueryParams,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<MoveRecord>> {
        let kind = EventKind::MovedSubaccount;
        let operation = format!("fetch {kind} events");
        let params = &params;
        self.retry
            .execute(&operation, cancel, || async move {
                let walker = PageWalker::new(client, &self.paging, &self.query.page_num_field);
                let mut moves = Vec::new();
                walker
                    .walk(kind, params.clone(), cancel, |page| {
                        moves.extend(self.decoder.decode_moves(page));
                    })
                    .await?;
                Ok(moves)
            })
            .await
    }
}

fn contains_entity(tenants: &[TenantRecord], entity_id: &str) -> bool {
    tenants.iter().any(|t| t.external_id == entity_id)
}

fn moves_contain(moves: &[MoveRecord], subaccount_id: &str) -> bool {
    moves.iter().any(|m| m.subaccount_id == subaccount_id)
}
