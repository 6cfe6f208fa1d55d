//! Tenant hierarchy data model.
//!
//! Records flow through one pass as:
//!
//! ```text
//! raw event ──► TenantRecord / MoveRecord ──► TenantWriteInput ──► write API
//!                      │
//!                      └── parents resolved against StoredTenant (internal IDs)
//! ```

use serde::{Deserialize, Serialize};

/// Provider name stamped on tenants created by the on-demand path when no
/// creation event exists yet.
pub const LAZILY_CREATED_PROVIDER: &str = "lazily-tenant-fetcher";

/// Tenant type in the customer → account → subaccount tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TenantType {
    Customer,
    Account,
    Subaccount,
    CostObject,
}

impl TenantType {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantType::Customer => "customer",
            TenantType::Account => "account",
            TenantType::Subaccount => "subaccount",
            TenantType::CostObject => "cost-object",
        }
    }

    /// Type of a parent synthesized for a child of this type.
    #[must_use]
    pub fn synthesized_parent_type(&self) -> TenantType {
        match self {
            TenantType::Account => TenantType::Customer,
            _ => TenantType::Account,
        }
    }
}

impl std::fmt::Display for TenantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TenantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" => Ok(TenantType::Customer),
            "account" => Ok(TenantType::Account),
            "subaccount" => Ok(TenantType::Subaccount),
            "cost-object" | "cost_object" | "costobject" => Ok(TenantType::CostObject),
            _ => Err(format!("Unknown tenant type: {s}")),
        }
    }
}

/// A tenant as described by the upstream source of truth.
///
/// Identity key is `external_id`. `parents` holds external IDs until the
/// hierarchy builder rewrites the ones already known to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRecord {
    pub external_id: String,
    pub name: String,
    pub parents: Vec<String>,
    pub subdomain: String,
    pub region: String,
    pub tenant_type: TenantType,
    pub provider: String,
    pub license_type: Option<String>,
    pub customer_id: Option<String>,
    pub cost_object_id: Option<String>,
    pub cost_object_type: Option<String>,
}

impl TenantRecord {
    /// Create a record with only identity, type and provider set.
    pub fn new(
        external_id: impl Into<String>,
        name: impl Into<String>,
        tenant_type: TenantType,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            name: name.into(),
            parents: Vec::new(),
            subdomain: String::new(),
            region: String::new(),
            tenant_type,
            provider: provider.into(),
            license_type: None,
            customer_id: None,
            cost_object_id: None,
            cost_object_type: None,
        }
    }

    /// Builder-style setter for a single parent.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    /// Builder-style setter for the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Builder-style setter for the subdomain.
    #[must_use]
    pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = subdomain.into();
        self
    }
}

/// A tenant as currently persisted, keyed by its internal ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTenant {
    pub id: String,
    pub external_id: String,
    pub name: String,
    /// Internal IDs of the parents.
    pub parents: Vec<String>,
    pub tenant_type: TenantType,
    pub provider: String,
    pub subdomain: String,
    pub region: String,
}

/// Re-parenting request decoded from a "moved" event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub subaccount_id: String,
    pub source_id: String,
    pub target_id: String,
    /// Full subaccount payload, used when the subaccount is not yet stored.
    pub tenant: TenantRecord,
}

/// Durable cursor of a sync job. Timestamps are unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub last_consumed_timestamp: i64,
    pub last_full_resync_timestamp: i64,
}

/// Payload sent to the write API for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantWriteInput {
    pub name: String,
    pub external_tenant: String,
    pub parents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(rename = "type")]
    pub tenant_type: TenantType,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_object_type: Option<String>,
}

impl From<&TenantRecord> for TenantWriteInput {
    fn from(record: &TenantRecord) -> Self {
        Self {
            name: record.name.clone(),
            external_tenant: record.external_id.clone(),
            parents: record.parents.clone(),
            subdomain: non_empty(&record.subdomain),
            region: non_empty(&record.region),
            tenant_type: record.tenant_type,
            provider: record.provider.clone(),
            license_type: record.license_type.clone(),
            customer_id: record.customer_id.clone(),
            cost_object_id: record.cost_object_id.clone(),
            cost_object_type: record.cost_object_type.clone(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Workload runtime registered under a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    pub id: String,
    pub name: String,
}

/// Scenario assignment of one runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioLabel {
    pub runtime_id: String,
    pub scenarios: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesized_parent_type() {
        assert_eq!(
            TenantType::Account.synthesized_parent_type(),
            TenantType::Customer
        );
        assert_eq!(
            TenantType::Subaccount.synthesized_parent_type(),
            TenantType::Account
        );
        assert_eq!(
            TenantType::CostObject.synthesized_parent_type(),
            TenantType::Account
        );
    }

    #[test]
    fn test_tenant_type_from_str() {
        assert_eq!("Account".parse::<TenantType>(), Ok(TenantType::Account));
        assert_eq!(
            "cost_object".parse::<TenantType>(),
            Ok(TenantType::CostObject)
        );
        assert!("team".parse::<TenantType>().is_err());
    }

    #[test]
    fn test_write_input_serialization() {
        let record = TenantRecord::new("sub-1", "Sub 1", TenantType::Subaccount, "provider")
            .with_parent("ga-1")
            .with_region("cf-eu10");
        let input = TenantWriteInput::from(&record);
        let json = serde_json::to_value(&input).unwrap();

        assert_eq!(json["externalTenant"], "sub-1");
        assert_eq!(json["type"], "subaccount");
        assert_eq!(json["region"], "cf-eu10");
        assert!(json.get("subdomain").is_none());
    }
}
