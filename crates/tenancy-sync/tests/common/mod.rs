//! Shared manual mocks for tenancy-sync integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use tenancy_sync::director::DirectorWriteClient;
use tenancy_sync::error::{SyncError, SyncResult};
use tenancy_sync::events::{EventApiClient, EventKind, EventsPage, QueryParams};
use tenancy_sync::model::{
    Runtime, ScenarioLabel, StoredTenant, TenantType, TenantWriteInput, Watermark,
};
use tenancy_sync::storage::{LabelRepository, RuntimeService, TenantReadTx, TenantStorage};
use tenancy_sync::watermark::{Clock, WatermarkStore};

// =============================================================================
// Fixtures
// =============================================================================

pub fn stored(external_id: &str, tenant_type: TenantType, parents: &[&str]) -> StoredTenant {
    StoredTenant {
        id: internal_id(external_id),
        external_id: external_id.to_string(),
        name: external_id.to_string(),
        parents: parents.iter().map(|p| p.to_string()).collect(),
        tenant_type,
        provider: "external-provider".to_string(),
        subdomain: String::new(),
        region: String::new(),
    }
}

/// Internal ID the mocks assign to an external ID.
pub fn internal_id(external_id: &str) -> String {
    format!("id-{external_id}")
}

pub fn account_event(id: &str, customer: Option<&str>) -> Value {
    let mut data = json!({ "guid": id, "displayName": format!("Account {id}") });
    if let Some(customer) = customer {
        data["customerId"] = json!(customer);
    }
    json!({ "type": "GlobalAccount", "globalAccountGUID": id, "eventData": data })
}

pub fn subaccount_event(id: &str, parent: &str, region: &str) -> Value {
    json!({
        "type": "Subaccount",
        "globalAccountGUID": parent,
        "eventData": {
            "subaccountGuid": id,
            "displayName": format!("Subaccount {id}"),
            "subdomain": id,
            "region": region
        }
    })
}

pub fn move_event(subaccount: &str, source: &str, target: &str) -> Value {
    json!({
        "type": "Subaccount",
        "globalAccountGUID": target,
        "eventData": {
            "subaccountGuid": subaccount,
            "sourceGlobalAccountGUID": source,
            "targetGlobalAccountGUID": target,
            "displayName": format!("Subaccount {subaccount}"),
            "region": "eu10"
        }
    })
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

// =============================================================================
// Tenant storage
// =============================================================================

/// In-memory tenant storage that counts read scopes.
#[derive(Default)]
pub struct MockStorage {
    tenants: Arc<Mutex<HashMap<String, StoredTenant>>>,
    begin_count: AtomicUsize,
    commit_count: Arc<AtomicUsize>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(self, tenant: StoredTenant) -> Self {
        self.insert(tenant);
        self
    }

    pub fn insert(&self, tenant: StoredTenant) {
        self.tenants
            .lock()
            .unwrap()
            .insert(tenant.external_id.clone(), tenant);
    }

    pub fn get(&self, external_id: &str) -> Option<StoredTenant> {
        self.tenants.lock().unwrap().get(external_id).cloned()
    }

    pub fn begin_calls(&self) -> usize {
        self.begin_count.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_count.load(Ordering::SeqCst)
    }
}

struct MockReadTx {
    tenants: Arc<Mutex<HashMap<String, StoredTenant>>>,
    commit_count: Arc<AtomicUsize>,
}

#[async_trait]
impl TenantReadTx for MockReadTx {
    async fn get_by_external_id(&mut self, external_id: &str) -> SyncResult<Option<StoredTenant>> {
        Ok(self.tenants.lock().unwrap().get(external_id).cloned())
    }

    async fn list_by_external_ids(
        &mut self,
        external_ids: &[String],
    ) -> SyncResult<Vec<StoredTenant>> {
        let tenants = self.tenants.lock().unwrap();
        Ok(external_ids
            .iter()
            .filter_map(|id| tenants.get(id).cloned())
            .collect())
    }

    async fn commit(&mut self) -> SyncResult<()> {
        self.commit_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TenantStorage for MockStorage {
    async fn begin_read(&self) -> SyncResult<Box<dyn TenantReadTx>> {
        self.begin_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockReadTx {
            tenants: Arc::clone(&self.tenants),
            commit_count: Arc::clone(&self.commit_count),
        }))
    }
}

// =============================================================================
// Director write API
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DirectorCall {
    Write(Vec<TenantWriteInput>),
    Delete(Vec<TenantWriteInput>),
    Update(String, TenantWriteInput),
}

/// Records every director call. Writes can be materialized into a
/// [`MockStorage`] so later reads observe them.
#[derive(Default)]
pub struct MockDirector {
    calls: Mutex<Vec<DirectorCall>>,
    fail_writes: AtomicBool,
    storage: Option<Arc<MockStorage>>,
}

impl MockDirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backed_by(storage: Arc<MockStorage>) -> Self {
        Self {
            storage: Some(storage),
            ..Self::default()
        }
    }

    pub fn with_write_error(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<DirectorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<TenantWriteInput> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DirectorCall::Write(batch) => Some(batch),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn deleted(&self) -> Vec<TenantWriteInput> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DirectorCall::Delete(batch) => Some(batch),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn updates(&self) -> Vec<(String, TenantWriteInput)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DirectorCall::Update(id, input) => Some((id, input)),
                _ => None,
            })
            .collect()
    }

    pub fn write_call_sizes(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DirectorCall::Write(batch) => Some(batch.len()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl DirectorWriteClient for MockDirector {
    async fn write_tenants(&self, tenants: &[TenantWriteInput]) -> SyncResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::director("writeTenants failed: boom"));
        }
        self.calls
            .lock()
            .unwrap()
            .push(DirectorCall::Write(tenants.to_vec()));
        if let Some(storage) = &self.storage {
            for tenant in tenants {
                storage.insert(StoredTenant {
                    id: internal_id(&tenant.external_tenant),
                    external_id: tenant.external_tenant.clone(),
                    name: tenant.name.clone(),
                    parents: tenant.parents.clone(),
                    tenant_type: tenant.tenant_type,
                    provider: tenant.provider.clone(),
                    subdomain: tenant.subdomain.clone().unwrap_or_default(),
                    region: tenant.region.clone().unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    async fn delete_tenants(&self, tenants: &[TenantWriteInput]) -> SyncResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(DirectorCall::Delete(tenants.to_vec()));
        Ok(())
    }

    async fn update_tenant(&self, id: &str, tenant: &TenantWriteInput) -> SyncResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(DirectorCall::Update(id.to_string(), tenant.clone()));
        Ok(())
    }
}

// =============================================================================
// Runtimes and labels
// =============================================================================

#[derive(Default)]
pub struct MockRuntimes {
    runtimes: HashMap<String, Vec<Runtime>>,
}

impl MockRuntimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime(mut self, subaccount: &str, runtime_id: &str) -> Self {
        self.runtimes
            .entry(subaccount.to_string())
            .or_default()
            .push(Runtime {
                id: runtime_id.to_string(),
                name: format!("runtime {runtime_id}"),
            });
        self
    }
}

#[async_trait]
impl RuntimeService for MockRuntimes {
    async fn list_runtimes(&self, subaccount_external_id: &str) -> SyncResult<Vec<Runtime>> {
        Ok(self
            .runtimes
            .get(subaccount_external_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Scenario labels keyed by (internal tenant ID, runtime ID).
#[derive(Default)]
pub struct MockLabels {
    labels: HashMap<(String, String), Vec<String>>,
}

impl MockLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scenarios(mut self, tenant_id: &str, runtime_id: &str, scenarios: &[&str]) -> Self {
        self.labels.insert(
            (tenant_id.to_string(), runtime_id.to_string()),
            scenarios.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl LabelRepository for MockLabels {
    async fn get_scenario_labels(
        &self,
        tenant_id: &str,
        runtime_ids: &[String],
    ) -> SyncResult<Vec<ScenarioLabel>> {
        Ok(runtime_ids
            .iter()
            .filter_map(|runtime_id| {
                self.labels
                    .get(&(tenant_id.to_string(), runtime_id.clone()))
                    .map(|scenarios| ScenarioLabel {
                        runtime_id: runtime_id.clone(),
                        scenarios: scenarios.clone(),
                    })
            })
            .collect())
    }
}

// =============================================================================
// Events API
// =============================================================================

/// Serves one page of events per kind and records every request.
#[derive(Default)]
pub struct MockEventClient {
    events: HashMap<EventKind, Vec<Value>>,
    failure: Option<u16>,
    requests: Mutex<Vec<(EventKind, QueryParams)>>,
}

impl MockEventClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, kind: EventKind, events: Vec<Value>) -> Self {
        self.events.insert(kind, events);
        self
    }

    /// Answer every request with the given HTTP status.
    pub fn with_failure(mut self, status: u16) -> Self {
        self.failure = Some(status);
        self
    }

    pub fn requests(&self) -> Vec<(EventKind, QueryParams)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, kind: EventKind) -> Vec<QueryParams> {
        self.requests()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p)
            .collect()
    }
}

#[async_trait]
impl EventApiClient for MockEventClient {
    async fn fetch_page(
        &self,
        kind: EventKind,
        params: &QueryParams,
    ) -> SyncResult<Option<EventsPage>> {
        self.requests.lock().unwrap().push((kind, params.clone()));
        if let Some(status) = self.failure {
            return Err(SyncError::event_api(status, "unavailable"));
        }
        let Some(events) = self.events.get(&kind) else {
            return Ok(None);
        };
        let entity = params.get("entityId");
        let events: Vec<Value> = events
            .iter()
            .filter(|e| match entity {
                Some(id) => {
                    e["eventData"]["subaccountGuid"] == json!(id)
                        || e["eventData"]["guid"] == json!(id)
                }
                None => true,
            })
            .cloned()
            .collect();
        Ok(Some(EventsPage::new(json!({
            "total": events.len(),
            "totalPages": 1,
            "events": events
        }))))
    }
}

// =============================================================================
// Watermark and clock
// =============================================================================

/// Watermark store that can be told to fail on write.
#[derive(Default)]
pub struct MockWatermarkStore {
    watermark: Mutex<Watermark>,
    fail_put: AtomicBool,
    put_count: AtomicUsize,
}

impl MockWatermarkStore {
    pub fn new(watermark: Watermark) -> Self {
        Self {
            watermark: Mutex::new(watermark),
            ..Self::default()
        }
    }

    pub fn with_put_error(self) -> Self {
        self.fail_put.store(true, Ordering::SeqCst);
        self
    }

    pub fn current(&self) -> Watermark {
        *self.watermark.lock().unwrap()
    }

    pub fn put_calls(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatermarkStore for MockWatermarkStore {
    async fn get(&self) -> SyncResult<Watermark> {
        Ok(self.current())
    }

    async fn put(&self, watermark: Watermark) -> SyncResult<()> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(SyncError::watermark("label store unavailable"));
        }
        *self.watermark.lock().unwrap() = watermark;
        Ok(())
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
