//! Re-parenting of subaccounts across global accounts.
//!
//! A move is refused while any runtime of the subaccount is still assigned to
//! a non-default scenario in the source account.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::director::DirectorWriteClient;
use crate::error::{SyncError, SyncResult};
use crate::model::{MoveRecord, StoredTenant, TenantRecord, TenantType, TenantWriteInput};
use crate::storage::{LabelRepository, RuntimeService, TenantStorage};

/// Scenario every runtime belongs to; it never blocks a move.
pub const DEFAULT_SCENARIO: &str = "DEFAULT";

/// Result of processing one move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The subaccount's parent was updated to the target.
    Moved,
    /// The subaccount did not exist yet and was created under the target.
    CreatedUnderTarget,
    /// The subaccount already had the target as parent.
    AlreadyApplied,
}

/// Applies move records one at a time, without chunking.
pub struct MoveProcessor {
    storage: Arc<dyn TenantStorage>,
    director: Arc<dyn DirectorWriteClient>,
    runtimes: Arc<dyn RuntimeService>,
    labels: Arc<dyn LabelRepository>,
    provider: String,
}

impl MoveProcessor {
    pub fn new(
        storage: Arc<dyn TenantStorage>,
        director: Arc<dyn DirectorWriteClient>,
        runtimes: Arc<dyn RuntimeService>,
        labels: Arc<dyn LabelRepository>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            director,
            runtimes,
            labels,
            provider: provider.into(),
        }
    }

    /// Move one subaccount under its target account.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MovePrecondition`] when a runtime of the
    /// subaccount still carries a non-default scenario in the source account.
    /// Storage and write API failures are returned as-is.
    pub async fn move_subaccount(&self, record: &MoveRecord) -> SyncResult<MoveOutcome> {
        // ── 1. Resolve (or create) the target account ────────────────────
        let target = self.resolve_target(&record.target_id).await?;

        // ── 2. Unknown subaccount: create it under the target ────────────
        let Some(subaccount) = self.storage.get_by_external_id(&record.subaccount_id).await?
        else {
            info!(
                subaccount_id = %record.subaccount_id,
                target_id = %record.target_id,
                "Subaccount not found, creating it under the move target"
            );
            let input = reparented(&record.tenant, &target.id);
            self.director.write_tenants(&[input]).await?;
            return Ok(MoveOutcome::CreatedUnderTarget);
        };

        // ── 3. Already under the target ─────────────────────────────────
        if subaccount.parents.iter().any(|p| *p == target.id) {
            info!(
                subaccount_id = %record.subaccount_id,
                target_id = %record.target_id,
                "Subaccount is already moved"
            );
            return Ok(MoveOutcome::AlreadyApplied);
        }

        // ── 4. Scenario safety check ────────────────────────────────────
        self.check_scenarios(record).await?;

        // ── 5. Re-parent ────────────────────────────────────────────────
        let input = reparented(&record.tenant, &target.id);
        self.director.update_tenant(&subaccount.id, &input).await?;
        info!(
            subaccount_id = %record.subaccount_id,
            source_id = %record.source_id,
            target_id = %record.target_id,
            "Moved subaccount"
        );
        Ok(MoveOutcome::Moved)
    }

    async fn resolve_target(&self, target_id: &str) -> SyncResult<StoredTenant> {
        if let Some(target) = self.storage.get_by_external_id(target_id).await? {
            return Ok(target);
        }

        info!(target_id = %target_id, "Move target not found, creating it as an account");
        let account = TenantRecord::new(target_id, target_id, TenantType::Account, &self.provider);
        self.director
            .write_tenants(&[TenantWriteInput::from(&account)])
            .await?;

        self.storage
            .get_by_external_id(target_id)
            .await?
            .ok_or_else(|| SyncError::not_found("tenant", target_id))
    }

    async fn check_scenarios(&self, record: &MoveRecord) -> SyncResult<()> {
        let runtimes = self.runtimes.list_runtimes(&record.subaccount_id).await?;
        if runtimes.is_empty() {
            debug!(subaccount_id = %record.subaccount_id, "No runtimes in subaccount, skipping scenario check");
            return Ok(());
        }

        let Some(source) = self.storage.get_by_external_id(&record.source_id).await? else {
            warn!(
                source_id = %record.source_id,
                subaccount_id = %record.subaccount_id,
                "Move source not found, no scenario assignments to protect"
            );
            return Ok(());
        };

        let runtime_ids: Vec<String> = runtimes.into_iter().map(|r| r.id).collect();
        let labels = self
            .labels
            .get_scenario_labels(&source.id, &runtime_ids)
            .await?;

        for label in labels {
            if let Some(scenario) = label.scenarios.iter().find(|s| *s != DEFAULT_SCENARIO) {
                return Err(SyncError::MovePrecondition {
                    subaccount: record.subaccount_id.clone(),
                    source_tenant: record.source_id.clone(),
                    runtime_id: label.runtime_id,
                    scenario: scenario.clone(),
                });
            }
        }
        Ok(())
    }
}

fn reparented(tenant: &TenantRecord, parent_internal_id: &str) -> TenantWriteInput {
    let mut input = TenantWriteInput::from(tenant);
    input.parents = vec![parent_internal_id.to_string()];
    input
}
