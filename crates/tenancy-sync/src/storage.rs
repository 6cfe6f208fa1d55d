//! Read side of tenant storage and the runtime / label lookups used by moves.
//!
//! Storage reads that decide which candidates already exist run inside a
//! short read-only transaction ([`TenantReadTx`]). All writes go through the
//! director write API, never through this module.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::model::{Runtime, ScenarioLabel, StoredTenant};

/// Label key holding a runtime's scenario assignments.
pub const SCENARIOS_LABEL_KEY: &str = "scenarios";

/// Label key linking a runtime to its subaccount.
pub const SUBACCOUNT_LABEL_KEY: &str = "global_subaccount_id";

/// Read-only transaction scope over tenant storage.
#[async_trait]
pub trait TenantReadTx: Send {
    /// Get one tenant by external ID.
    async fn get_by_external_id(&mut self, external_id: &str) -> SyncResult<Option<StoredTenant>>;

    /// Batched lookup by external IDs; unknown IDs are simply absent.
    async fn list_by_external_ids(&mut self, external_ids: &[String])
        -> SyncResult<Vec<StoredTenant>>;

    /// Close the scope.
    async fn commit(&mut self) -> SyncResult<()>;
}

/// Tenant storage read interface.
#[async_trait]
pub trait TenantStorage: Send + Sync {
    /// Open a read-only transaction scope.
    async fn begin_read(&self) -> SyncResult<Box<dyn TenantReadTx>>;

    /// Single lookup in its own short scope.
    async fn get_by_external_id(&self, external_id: &str) -> SyncResult<Option<StoredTenant>> {
        let mut tx = self.begin_read().await?;
        let tenant = tx.get_by_external_id(external_id).await?;
        tx.commit().await?;
        Ok(tenant)
    }
}

/// Workload runtimes registered under a subaccount.
#[async_trait]
pub trait RuntimeService: Send + Sync {
    async fn list_runtimes(&self, subaccount_external_id: &str) -> SyncResult<Vec<Runtime>>;
}

/// Scenario labels of runtimes, scoped to one tenant.
#[async_trait]
pub trait LabelRepository: Send + Sync {
    async fn get_scenario_labels(
        &self,
        tenant_id: &str,
        runtime_ids: &[String],
    ) -> SyncResult<Vec<ScenarioLabel>>;
}

// ── Postgres adapters ───────────────────────────────────────────────────

/// Tenant storage backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgTenantStorage {
    pool: PgPool,
}

impl PgTenantStorage {
    /// Create a new storage reader.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStorage for PgTenantStorage {
    async fn begin_read(&self) -> SyncResult<Box<dyn TenantReadTx>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgReadTx { tx: Some(tx) }))
    }
}

struct PgReadTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgReadTx {
    fn conn(&mut self) -> SyncResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| SyncError::configuration("read transaction already committed"))
    }
}

const TENANT_SELECT: &str = r"
    SELECT t.id, t.external_name, t.external_tenant, t.type AS tenant_type,
           t.provider_name, t.subdomain, t.region,
           COALESCE(
               array_agg(tp.parent_id) FILTER (WHERE tp.parent_id IS NOT NULL),
               '{}'::uuid[]
           ) AS parents
    FROM business_tenant_mappings t
    LEFT JOIN tenant_parents tp ON tp.tenant_id = t.id
";

#[async_trait]
impl TenantReadTx for PgReadTx {
    async fn get_by_external_id(&mut self, external_id: &str) -> SyncResult<Option<StoredTenant>> {
        let query = format!("{TENANT_SELECT} WHERE t.external_tenant = $1 GROUP BY t.id");
        let row = sqlx::query_as::<_, TenantRow>(&query)
            .bind(external_id)
            .fetch_optional(self.conn()?)
            .await?;
        row.map(TenantRow::into_tenant).transpose()
    }

    async fn list_by_external_ids(
        &mut self,
        external_ids: &[String],
    ) -> SyncResult<Vec<StoredTenant>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("{TENANT_SELECT} WHERE t.external_tenant = ANY($1) GROUP BY t.id");
        let rows = sqlx::query_as::<_, TenantRow>(&query)
            .bind(external_ids)
            .fetch_all(self.conn()?)
            .await?;
        rows.into_iter().map(TenantRow::into_tenant).collect()
    }

    async fn commit(&mut self) -> SyncResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: Uuid,
    external_name: String,
    external_tenant: String,
    tenant_type: String,
    provider_name: String,
    subdomain: Option<String>,
    region: Option<String>,
    parents: Vec<Uuid>,
}

impl TenantRow {
    fn into_tenant(self) -> SyncResult<StoredTenant> {
        let tenant_type = self.tenant_type.parse().map_err(SyncError::decode)?;
        Ok(StoredTenant {
            id: self.id.to_string(),
            external_id: self.external_tenant,
            name: self.external_name,
            parents: self.parents.iter().map(Uuid::to_string).collect(),
            tenant_type,
            provider: self.provider_name,
            subdomain: self.subdomain.unwrap_or_default(),
            region: self.region.unwrap_or_default(),
        })
    }
}

/// Runtime lookup backed by Postgres labels.
#[derive(Debug, Clone)]
pub struct PgRuntimeService {
    pool: PgPool,
}

impl PgRuntimeService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuntimeService for PgRuntimeService {
    async fn list_runtimes(&self, subaccount_external_id: &str) -> SyncResult<Vec<Runtime>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r"
            SELECT DISTINCT r.id, r.name
            FROM runtimes r
            JOIN labels l ON l.runtime_id = r.id
            WHERE l.key = $1 AND l.value = to_jsonb($2::text)
            ",
        )
        .bind(SUBACCOUNT_LABEL_KEY)
        .bind(subaccount_external_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| Runtime {
                id: id.to_string(),
                name,
            })
            .collect())
    }
}

/// Scenario label lookup backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgLabelRepository {
    pool: PgPool,
}

impl PgLabelRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LabelRepository for PgLabelRepository {
    async fn get_scenario_labels(
        &self,
        tenant_id: &str,
        runtime_ids: &[String],
    ) -> SyncResult<Vec<ScenarioLabel>> {
        if runtime_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid, sqlx::types::Json<Vec<String>>)> = sqlx::query_as(
            r"
            SELECT runtime_id, value
            FROM labels
            WHERE tenant_id::text = $1
              AND key = $2
              AND runtime_id::text = ANY($3)
            ",
        )
        .bind(tenant_id)
        .bind(SCENARIOS_LABEL_KEY)
        .bind(runtime_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(runtime_id, scenarios)| ScenarioLabel {
                runtime_id: runtime_id.to_string(),
                scenarios: scenarios.0,
            })
            .collect())
    }
}
