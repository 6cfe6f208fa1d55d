//! Hierarchy builder.
//!
//! Turns the decoded create/update/delete records of one sync window into the
//! batch handed to the write API:
//!
//! ```text
//!  created ++ updated ──► dedupe ──► exclude(deleted) ──┐
//!                                                       ▼
//!                   storage lookup ──► missing parents + resolved candidates
//! ```
//!
//! External tenant IDs are the identity key throughout.

use std::collections::{HashMap, HashSet};

use crate::model::{StoredTenant, TenantRecord};

/// Tenants already present in storage, keyed by external ID.
pub type KnownTenants = HashMap<String, StoredTenant>;

/// Deduplicate by external ID.
///
/// Each external ID keeps the position of its first occurrence and the value
/// of its last one. A tenant listing itself as parent loses that parent.
#[must_use]
pub fn dedupe(tenants: Vec<TenantRecord>) -> Vec<TenantRecord> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(tenants.len());
    let mut result: Vec<TenantRecord> = Vec::with_capacity(tenants.len());

    for mut tenant in tenants {
        let own_id = tenant.external_id.clone();
        tenant.parents.retain(|parent| *parent != own_id);

        match positions.get(&own_id) {
            Some(&index) => result[index] = tenant,
            None => {
                positions.insert(own_id, result.len());
                result.push(tenant);
            }
        }
    }

    result
}

/// Remove every tenant whose external ID appears in `excluded`.
#[must_use]
pub fn exclude(tenants: Vec<TenantRecord>, excluded: &[TenantRecord]) -> Vec<TenantRecord> {
    let excluded_ids: HashSet<&str> = excluded.iter().map(|t| t.external_id.as_str()).collect();
    tenants
        .into_iter()
        .filter(|t| !excluded_ids.contains(t.external_id.as_str()))
        .collect()
}

/// External IDs to look up in storage: every tenant, its parents, and the
/// deleted tenants.
#[must_use]
pub fn lookup_ids(candidates: &[TenantRecord], deleted: &[TenantRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let all = candidates
        .iter()
        .flat_map(|t| std::iter::once(&t.external_id).chain(t.parents.iter()))
        .chain(deleted.iter().map(|t| &t.external_id));

    for id in all {
        if !id.is_empty() && seen.insert(id.as_str()) {
            ids.push(id.clone());
        }
    }
    ids
}

/// Minimal records for parents that are neither stored nor in the batch.
///
/// A child of type Account gets a Customer parent, any other child an
/// Account parent. Each missing parent is synthesized once.
#[must_use]
pub fn missing_parents(
    candidates: &[TenantRecord],
    known: &KnownTenants,
    provider: &str,
) -> Vec<TenantRecord> {
    let batch_ids: HashSet<&str> = candidates.iter().map(|t| t.external_id.as_str()).collect();
    let mut synthesized: HashSet<&str> = HashSet::new();
    let mut parents = Vec::new();

    for child in candidates {
        for parent in &child.parents {
            if parent.is_empty()
                || known.contains_key(parent)
                || batch_ids.contains(parent.as_str())
                || !synthesized.insert(parent.as_str())
            {
                continue;
            }
            parents.push(TenantRecord::new(
                parent,
                parent,
                child.tenant_type.synthesized_parent_type(),
                provider,
            ));
        }
    }

    parents
}

/// Rewrite parents known to storage to their internal IDs.
///
/// Parents created in the same batch keep their external ID; the write API
/// resolves them once they exist.
#[must_use]
pub fn resolve_parents(candidates: Vec<TenantRecord>, known: &KnownTenants) -> Vec<TenantRecord> {
    candidates
        .into_iter()
        .map(|mut tenant| {
            for parent in &mut tenant.parents {
                if let Some(stored) = known.get(parent.as_str()) {
                    *parent = stored.id.clone();
                }
            }
            tenant
        })
        .collect()
}

/// Stamp the sync window's region onto every candidate.
pub fn stamp_region(candidates: &mut [TenantRecord], region: &str) {
    if region.is_empty() {
        return;
    }
    for tenant in candidates {
        tenant.region = region.to_string();
    }
}

/// Build the ordered write batch: synthesized parents first, then the
/// region-stamped candidates with resolved parents.
#[must_use]
pub fn build_write_batch(
    candidates: Vec<TenantRecord>,
    known: &KnownTenants,
    region: &str,
    provider: &str,
) -> Vec<TenantRecord> {
    let mut batch = missing_parents(&candidates, known, provider);
    let mut resolved = resolve_parents(candidates, known);
    stamp_region(&mut resolved, region);
    batch.extend(resolved);
    batch
}

/// Deleted tenants that actually exist in storage.
#[must_use]
pub fn existing_deletes(deleted: Vec<TenantRecord>, known: &KnownTenants) -> Vec<TenantRecord> {
    deleted
        .into_iter()
        .filter(|t| known.contains_key(&t.external_id))
        .collect()
}
