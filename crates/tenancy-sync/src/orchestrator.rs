//! Resync orchestrator.
//!
//! One orchestrator serves every sync variant; the [`SyncScope`] passed to
//! [`ResyncOrchestrator::run`] selects which:
//!
//! ```text
//!  ┌──────────────────┐   watermark   ┌────────────────────────────────┐
//!  │  WatermarkStore  │◄─────────────►│       ResyncOrchestrator       │
//!  └──────────────────┘               │                                │
//!  ┌──────────────────┐   records     │  per region:                   │
//!  │   EventFetcher   │──────────────►│   fetch → dedupe → exclude     │
//!  └──────────────────┘               │   → read tx (known tenants)    │
//!  ┌──────────────────┐   read tx     │   → creates → moves → deletes  │
//!  │  TenantStorage   │◄──────────────│                                │
//!  └──────────────────┘               └──────────────┬─────────────────┘
//!                                                    │ chunks / moves
//!                                     ┌──────────────▼─────────────────┐
//!                                     │ DirectorWriteClient / Mover    │
//!                                     └────────────────────────────────┘
//! ```
//!
//! Writes happen outside the read transaction and are not atomic across
//! regions: a failed region fails the pass without undoing earlier regions,
//! and the unchanged watermark makes the next pass re-apply the window.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunk::run_in_chunks;
use crate::config::{JobKind, RegionConfig, SyncJobConfig};
use crate::director::DirectorWriteClient;
use crate::error::{SyncError, SyncResult};
use crate::events::EventKind;
use crate::fetcher::EventFetcher;
use crate::hierarchy::{self, KnownTenants};
use crate::model::{MoveRecord, TenantRecord, TenantType, TenantWriteInput, LAZILY_CREATED_PROVIDER};
use crate::mover::{MoveOutcome, MoveProcessor};
use crate::storage::TenantStorage;
use crate::watermark::{Clock, ResyncWindow, SystemClock, WatermarkStore};

/// Chunk size used when applying an on-demand tenant.
pub const ON_DEMAND_CHUNK_SIZE: usize = 5;

/// What one orchestrator run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Global accounts with one implicit region.
    GlobalAccounts,
    /// Subaccounts of each listed region, including moves.
    Subaccounts { regions: Vec<RegionConfig> },
    /// One subaccount, fetched on demand.
    SingleSubaccount {
        external_id: String,
        parent_id: String,
    },
}

impl SyncScope {
    /// Batch scope of a configured job.
    #[must_use]
    pub fn for_job(config: &SyncJobConfig) -> Self {
        match config.kind {
            JobKind::GlobalAccount => SyncScope::GlobalAccounts,
            JobKind::Subaccount => SyncScope::Subaccounts {
                regions: config.regions.clone(),
            },
        }
    }
}

impl std::fmt::Display for SyncScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncScope::GlobalAccounts => write!(f, "global-accounts"),
            SyncScope::Subaccounts { regions } => write!(f, "subaccounts({} regions)", regions.len()),
            SyncScope::SingleSubaccount { external_id, .. } => write!(f, "subaccount:{external_id}"),
        }
    }
}

/// Counts of one region's apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionReport {
    pub region: String,
    pub written: usize,
    pub moved: usize,
    pub skipped_moves: usize,
    pub deleted: usize,
}

/// Summary of a batch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub full_resync: bool,
    pub window_start: i64,
    pub regions: Vec<RegionReport>,
}

/// Result of an on-demand sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDemandOutcome {
    /// The tenant was already in storage.
    AlreadySynced,
    /// The tenant was created from its creation event.
    Created,
    /// No creation event exists yet; a placeholder was created.
    LazilyCreated,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Pass(PassReport),
    OnDemand(OnDemandOutcome),
}

/// Event kinds consumed by one batch scope.
struct ScopeKinds {
    created: EventKind,
    updated: EventKind,
    deleted: EventKind,
    moved: Option<EventKind>,
}

const ACCOUNT_KINDS: ScopeKinds = ScopeKinds {
    created: EventKind::CreatedAccount,
    updated: EventKind::UpdatedAccount,
    deleted: EventKind::DeletedAccount,
    moved: None,
};

const SUBACCOUNT_KINDS: ScopeKinds = ScopeKinds {
    created: EventKind::CreatedSubaccount,
    updated: EventKind::UpdatedSubaccount,
    deleted: EventKind::DeletedSubaccount,
    moved: Some(EventKind::MovedSubaccount),
};

/// Region processed by a pass: the query region (if any) and the value
/// stamped on tenants.
struct RegionTarget<'a> {
    query: Option<&'a RegionConfig>,
    stamp: String,
}

/// Drives sync passes against the injected capabilities.
pub struct ResyncOrchestrator {
    config: SyncJobConfig,
    fetcher: EventFetcher,
    storage: Arc<dyn TenantStorage>,
    director: Arc<dyn DirectorWriteClient>,
    watermarks: Arc<dyn WatermarkStore>,
    mover: Option<MoveProcessor>,
    clock: Arc<dyn Clock>,
}

impl ResyncOrchestrator {
    pub fn new(
        config: SyncJobConfig,
        fetcher: EventFetcher,
        storage: Arc<dyn TenantStorage>,
        director: Arc<dyn DirectorWriteClient>,
        watermarks: Arc<dyn WatermarkStore>,
    ) -> Self {
        Self {
            config,
            fetcher,
            storage,
            director,
            watermarks,
            mover: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Enable move handling (required for subaccount scopes).
    #[must_use]
    pub fn with_move_processor(mut self, mover: MoveProcessor) -> Self {
        self.mover = Some(mover);
        self
    }

    /// Replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Job configuration.
    #[must_use]
    pub fn config(&self) -> &SyncJobConfig {
        &self.config
    }

    /// Run the given scope once.
    pub async fn run(&self, scope: &SyncScope, cancel: &CancellationToken) -> SyncResult<SyncOutcome> {
        let result = match scope {
            SyncScope::GlobalAccounts => {
                let targets = vec![RegionTarget {
                    query: None,
                    stamp: self.config.central_region.clone(),
                }];
                self.run_pass(targets, &ACCOUNT_KINDS, cancel)
                    .await
                    .map(SyncOutcome::Pass)
            }
            SyncScope::Subaccounts { regions } => {
                let targets = regions
                    .iter()
                    .map(|r| RegionTarget {
                        query: Some(r),
                        stamp: r.full_name(),
                    })
                    .collect();
                self.run_pass(targets, &SUBACCOUNT_KINDS, cancel)
                    .await
                    .map(SyncOutcome::Pass)
            }
            SyncScope::SingleSubaccount {
                external_id,
                parent_id,
            } => self
                .sync_single(external_id, parent_id, cancel)
                .await
                .map(SyncOutcome::OnDemand),
        };

        if let Err(e) = &result {
            error!(job = %self.config.name, scope = %scope, error = %e, "Tenant sync failed");
        }
        result
    }

    async fn run_pass(
        &self,
        targets: Vec<RegionTarget<'_>>,
        kinds: &ScopeKinds,
        cancel: &CancellationToken,
    ) -> SyncResult<PassReport> {
        if kinds.moved.is_some() && self.mover.is_none() {
            return Err(SyncError::configuration(
                "subaccount sync requires a move processor",
            ));
        }

        // ── 1. Read watermark and plan the window ───────────────────────
        let watermark = self.watermarks.get().await?;
        let window = ResyncWindow::plan(
            watermark,
            self.config.full_resync_interval(),
            self.clock.now(),
        );
        info!(
            job = %self.config.name,
            full_resync = window.full_resync,
            window_start = window.start,
            "Starting tenant sync pass"
        );

        // ── 2. Region by region ──────────────────────────────────────────
        let mut regions = Vec::with_capacity(targets.len());
        for target in &targets {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let report = self.sync_region(target, kinds, window.start, cancel).await?;
            regions.push(report);
        }

        // ── 3. Persist the watermark ────────────────────────────────────
        self.watermarks.put(window.next_watermark()).await?;

        let report = PassReport {
            full_resync: window.full_resync,
            window_start: window.start,
            regions,
        };
        info!(
            job = %self.config.name,
            full_resync = report.full_resync,
            written = report.regions.iter().map(|r| r.written).sum::<usize>(),
            moved = report.regions.iter().map(|r| r.moved).sum::<usize>(),
            skipped_moves = report.regions.iter().map(|r| r.skipped_moves).sum::<usize>(),
            deleted = report.regions.iter().map(|r| r.deleted).sum::<usize>(),
            "Tenant sync pass completed"
        );
        Ok(report)
    }

    async fn sync_region(
        &self,
        target: &RegionTarget<'_>,
        kinds: &ScopeKinds,
        window_start: i64,
        cancel: &CancellationToken,
    ) -> SyncResult<RegionReport> {
        let mut report = RegionReport {
            region: target.stamp.clone(),
            ..RegionReport::default()
        };

        // ── 1. Fetch every event kind ───────────────────────────────────
        let created = self
            .fetcher
            .fetch_tenants(kinds.created, target.query, window_start, cancel)
            .await?;
        let updated = self
            .fetcher
            .fetch_tenants(kinds.updated, target.query, window_start, cancel)
            .await?;
        let deleted = self
            .fetcher
            .fetch_tenants(kinds.deleted, target.query, window_start, cancel)
            .await?;
        let moves = match kinds.moved {
            Some(_) => {
                self.fetcher
                    .fetch_moves(target.query, window_start, cancel)
                    .await?
            }
            None => Vec::new(),
        };

        if created.is_empty() && updated.is_empty() && deleted.is_empty() && moves.is_empty() {
            info!(region = %target.stamp, "No new events, nothing to apply");
            return Ok(report);
        }

        // ── 2. Dedupe and exclude deleted ───────────────────────────────
        // A create event takes precedence over an update of the same tenant.
        let updated = hierarchy::exclude(updated, &created);
        let mut candidates = created;
        candidates.extend(updated);
        let deleted = hierarchy::dedupe(deleted);
        let candidates = hierarchy::exclude(hierarchy::dedupe(candidates), &deleted);

        // ── 3. Resolve against storage in a read-only scope ─────────────
        let known = self.known_tenants(&candidates, &deleted).await?;

        // ── 4. Creates ──────────────────────────────────────────────────
        let batch = hierarchy::build_write_batch(
            candidates,
            &known,
            &target.stamp,
            &self.config.provider,
        );
        let inputs: Vec<TenantWriteInput> = batch.iter().map(TenantWriteInput::from).collect();
        run_in_chunks(&inputs, self.config.chunk_size, |chunk| {
            self.director.write_tenants(chunk)
        })
        .await?;
        report.written = inputs.len();

        // ── 5. Moves ────────────────────────────────────────────────────
        if let Some(mover) = &self.mover {
            for mut record in moves {
                hierarchy::stamp_region(std::slice::from_mut(&mut record.tenant), &target.stamp);
                match self.apply_move(mover, &record).await? {
                    Some(MoveOutcome::AlreadyApplied) => {}
                    Some(_) => report.moved += 1,
                    None => report.skipped_moves += 1,
                }
            }
        }

        // ── 6. Deletes ──────────────────────────────────────────────────
        let deletes: Vec<TenantWriteInput> = hierarchy::existing_deletes(deleted, &known)
            .iter()
            .map(TenantWriteInput::from)
            .collect();
        run_in_chunks(&deletes, self.config.chunk_size, |chunk| {
            self.director.delete_tenants(chunk)
        })
        .await?;
        report.deleted = deletes.len();

        info!(
            region = %report.region,
            written = report.written,
            moved = report.moved,
            skipped_moves = report.skipped_moves,
            deleted = report.deleted,
            "Applied region changes"
        );
        Ok(report)
    }

    /// Apply one move. `Ok(None)` means the move was refused by its
    /// scenario precondition and skipped.
    async fn apply_move(
        &self,
        mover: &MoveProcessor,
        record: &MoveRecord,
    ) -> SyncResult<Option<MoveOutcome>> {
        match mover.move_subaccount(record).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) if e.is_move_precondition() => {
                warn!(
                    subaccount_id = %record.subaccount_id,
                    source_id = %record.source_id,
                    target_id = %record.target_id,
                    error = %e,
                    "Skipping subaccount move"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn known_tenants(
        &self,
        candidates: &[TenantRecord],
        deleted: &[TenantRecord],
    ) -> SyncResult<KnownTenants> {
        let ids = hierarchy::lookup_ids(candidates, deleted);
        if ids.is_empty() {
            return Ok(KnownTenants::new());
        }

        let mut tx = self.storage.begin_read().await?;
        let stored = tx.list_by_external_ids(&ids).await?;
        tx.commit().await?;

        debug!(requested = ids.len(), found = stored.len(), "Resolved tenants in storage");
        Ok(stored
            .into_iter()
            .map(|t| (t.external_id.clone(), t))
            .collect())
    }

    async fn sync_single(
        &self,
        external_id: &str,
        parent_id: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<OnDemandOutcome> {
        // ── 1. Already synced? ──────────────────────────────────────────
        if self.storage.get_by_external_id(external_id).await?.is_some() {
            info!(tenant_id = %external_id, "Tenant already exists, nothing to sync");
            return Ok(OnDemandOutcome::AlreadySynced);
        }

        // ── 2. Look for its creation event ──────────────────────────────
        let records = self
            .fetcher
            .fetch_by_entity(EventKind::CreatedSubaccount, external_id, cancel)
            .await?;
        let matching = records
            .iter()
            .filter(|t| t.external_id == external_id)
            .count();

        // ── 3. Build and apply ──────────────────────────────────────────
        let (inputs, outcome) = match matching {
            0 => {
                info!(
                    tenant_id = %external_id,
                    parent_id = %parent_id,
                    "No create event found, creating tenant lazily"
                );
                let record = TenantRecord::new(
                    external_id,
                    external_id,
                    TenantType::Subaccount,
                    LAZILY_CREATED_PROVIDER,
                )
                .with_parent(parent_id);
                (vec![TenantWriteInput::from(&record)], OnDemandOutcome::LazilyCreated)
            }
            1 => {
                let records = hierarchy::dedupe(records);
                let region = records
                    .iter()
                    .find(|t| t.external_id == external_id)
                    .map(|t| self.stamped_region(&t.region))
                    .unwrap_or_default();

                let ids = hierarchy::lookup_ids(&records, &[]);
                let mut tx = self.storage.begin_read().await?;
                let stored = tx.list_by_external_ids(&ids).await?;
                tx.commit().await?;
                let known: KnownTenants = stored
                    .into_iter()
                    .map(|t| (t.external_id.clone(), t))
                    .collect();

                let batch = hierarchy::build_write_batch(
                    records,
                    &known,
                    &region,
                    &self.config.provider,
                );
                (
                    batch.iter().map(TenantWriteInput::from).collect(),
                    OnDemandOutcome::Created,
                )
            }
            count => {
                return Err(SyncError::Ambiguous {
                    external_id: external_id.to_string(),
                    count,
                });
            }
        };

        run_in_chunks(&inputs, ON_DEMAND_CHUNK_SIZE, |chunk| {
            self.director.write_tenants(chunk)
        })
        .await?;

        info!(tenant_id = %external_id, outcome = ?outcome, "Synchronized tenant on demand");
        Ok(outcome)
    }

    /// Region name stamped on tenants for an upstream region value.
    fn stamped_region(&self, region: &str) -> String {
        match self.config.region(region) {
            Some(configured) => configured.full_name(),
            None => region.to_string(),
        }
    }
}
