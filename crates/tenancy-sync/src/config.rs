//! Sync job configuration.
//!
//! Every field name used to read the upstream events payload is carried in a
//! mapping structure so a single generic decoder handles every event shape.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;

/// Which part of the hierarchy a job synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Global accounts (and their customers / cost objects), one implicit region.
    GlobalAccount,
    /// Subaccounts, iterated per configured region, including moves.
    Subaccount,
}

impl JobKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::GlobalAccount => "global-account",
            JobKind::Subaccount => "subaccount",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global-account" | "global_account" | "account" => Ok(JobKind::GlobalAccount),
            "subaccount" => Ok(JobKind::Subaccount),
            _ => Err(format!("Unknown job kind: {s}")),
        }
    }
}

/// Field names of the tenant events payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantFieldMapping {
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_name_field")]
    pub name_field: String,
    #[serde(default = "default_customer_id_field")]
    pub customer_id_field: String,
    #[serde(default = "default_subdomain_field")]
    pub subdomain_field: String,
    #[serde(default = "default_details_field")]
    pub details_field: String,
    #[serde(default = "default_region_field")]
    pub region_field: String,
    #[serde(default = "default_entity_type_field")]
    pub entity_type_field: String,
    #[serde(default = "default_global_account_guid_field")]
    pub global_account_guid_field: String,
    #[serde(default = "default_subaccount_id_field")]
    pub subaccount_id_field: String,
    /// Key under which the global account GUID is stored after flattening.
    /// Must not collide with a details field.
    #[serde(default = "default_global_account_key")]
    pub global_account_key: String,
    #[serde(default = "default_cost_object_id_field")]
    pub cost_object_id_field: String,
    #[serde(default = "default_subaccount_cost_object_id_field")]
    pub subaccount_cost_object_id_field: String,
    #[serde(default = "default_subaccount_cost_object_type_field")]
    pub subaccount_cost_object_type_field: String,
    #[serde(default = "default_license_type_field")]
    pub license_type_field: String,
    #[serde(default = "default_labels_field")]
    pub labels_field: String,
    /// Optional discriminator applied to created-account events.
    #[serde(default)]
    pub discriminator_field: Option<String>,
    #[serde(default)]
    pub discriminator_value: Option<String>,
}

fn default_id_field() -> String {
    "guid".to_string()
}

fn default_name_field() -> String {
    "displayName".to_string()
}

fn default_customer_id_field() -> String {
    "customerId".to_string()
}

fn default_subdomain_field() -> String {
    "subdomain".to_string()
}

fn default_details_field() -> String {
    "eventData".to_string()
}

fn default_region_field() -> String {
    "region".to_string()
}

fn default_entity_type_field() -> String {
    "type".to_string()
}

fn default_global_account_guid_field() -> String {
    "globalAccountGUID".to_string()
}

fn default_subaccount_id_field() -> String {
    "subaccountGuid".to_string()
}

fn default_global_account_key() -> String {
    "gaID".to_string()
}

fn default_cost_object_id_field() -> String {
    "costObjectId".to_string()
}

fn default_subaccount_cost_object_id_field() -> String {
    "costObjectId".to_string()
}

fn default_subaccount_cost_object_type_field() -> String {
    "costObjectType".to_string()
}

fn default_license_type_field() -> String {
    "licenseType".to_string()
}

fn default_labels_field() -> String {
    "labels".to_string()
}

impl Default for TenantFieldMapping {
    fn default() -> Self {
        Self {
            id_field: default_id_field(),
            name_field: default_name_field(),
            customer_id_field: default_customer_id_field(),
            subdomain_field: default_subdomain_field(),
            details_field: default_details_field(),
            region_field: default_region_field(),
            entity_type_field: default_entity_type_field(),
            global_account_guid_field: default_global_account_guid_field(),
            subaccount_id_field: default_subaccount_id_field(),
            global_account_key: default_global_account_key(),
            cost_object_id_field: default_cost_object_id_field(),
            subaccount_cost_object_id_field: default_subaccount_cost_object_id_field(),
            subaccount_cost_object_type_field: default_subaccount_cost_object_type_field(),
            license_type_field: default_license_type_field(),
            labels_field: default_labels_field(),
            discriminator_field: None,
            discriminator_value: None,
        }
    }
}

/// Field names specific to "moved subaccount" events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedSubaccountFieldMapping {
    #[serde(default = "default_subaccount_id_field")]
    pub subaccount_id_field: String,
    #[serde(default = "default_source_tenant_field")]
    pub source_tenant_field: String,
    #[serde(default = "default_target_tenant_field")]
    pub target_tenant_field: String,
}

fn default_source_tenant_field() -> String {
    "sourceGlobalAccountGUID".to_string()
}

fn default_target_tenant_field() -> String {
    "targetGlobalAccountGUID".to_string()
}

impl Default for MovedSubaccountFieldMapping {
    fn default() -> Self {
        Self {
            subaccount_id_field: default_subaccount_id_field(),
            source_tenant_field: default_source_tenant_field(),
            target_tenant_field: default_target_tenant_field(),
        }
    }
}

/// Query parameter names and start values for the events API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_page_num_field")]
    pub page_num_field: String,
    #[serde(default = "default_page_size_field")]
    pub page_size_field: String,
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    #[serde(default = "default_region_field")]
    pub region_field: String,
    #[serde(default = "default_entity_field")]
    pub entity_field: String,
    #[serde(default = "default_page_start_value")]
    pub page_start_value: String,
    #[serde(default = "default_page_size_value")]
    pub page_size_value: String,
}

fn default_page_num_field() -> String {
    "pageNum".to_string()
}

fn default_page_size_field() -> String {
    "pageSize".to_string()
}

fn default_timestamp_field() -> String {
    "timestamp".to_string()
}

fn default_entity_field() -> String {
    "entityId".to_string()
}

fn default_page_start_value() -> String {
    "1".to_string()
}

fn default_page_size_value() -> String {
    "150".to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_num_field: default_page_num_field(),
            page_size_field: default_page_size_field(),
            timestamp_field: default_timestamp_field(),
            region_field: default_region_field(),
            entity_field: default_entity_field(),
            page_start_value: default_page_start_value(),
            page_size_value: default_page_size_value(),
        }
    }
}

/// Location of the events array and page totals inside a page payload.
///
/// Paths are dotted (`"meta.total"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingConfig {
    #[serde(default = "default_events_field")]
    pub events_field: String,
    #[serde(default = "default_total_pages_field")]
    pub total_pages_field: String,
    #[serde(default = "default_total_results_field")]
    pub total_results_field: String,
}

fn default_events_field() -> String {
    "events".to_string()
}

fn default_total_pages_field() -> String {
    "totalPages".to_string()
}

fn default_total_results_field() -> String {
    "total".to_string()
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            events_field: default_events_field(),
            total_pages_field: default_total_pages_field(),
            total_results_field: default_total_results_field(),
        }
    }
}

/// Retry settings applied around one full page walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_retry_attempts() -> u32 {
    7
}

fn default_retry_delay_ms() -> u64 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Build the fixed-delay policy described by this config.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.attempts, Duration::from_millis(self.delay_ms))
    }
}

/// A region served by the subaccount job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Region name as understood by the events API.
    pub name: String,
    /// Prefix prepended to the name when stamping tenants.
    #[serde(default)]
    pub prefix: String,
    /// Whether the universal events client serves this region.
    #[serde(default = "default_true")]
    pub universal_client_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl RegionConfig {
    /// Create a region served by the universal client.
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            universal_client_enabled: true,
        }
    }

    /// Region name as stamped on tenants.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}{}", self.prefix, self.name)
    }
}

/// Configuration for one synchronization job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJobConfig {
    /// Job name, also the key of the job's watermark.
    pub name: String,
    pub kind: JobKind,
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Region stamped on global-account tenants.
    #[serde(default = "default_central_region")]
    pub central_region: String,
    /// Regions iterated by the subaccount job.
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
    #[serde(default = "default_full_resync_interval_secs")]
    pub full_resync_interval_secs: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub fields: TenantFieldMapping,
    #[serde(default)]
    pub moved_fields: MovedSubaccountFieldMapping,
}

fn default_provider() -> String {
    "external-provider".to_string()
}

fn default_central_region() -> String {
    "central".to_string()
}

fn default_full_resync_interval_secs() -> u64 {
    12 * 60 * 60
}

fn default_chunk_size() -> usize {
    500
}

impl SyncJobConfig {
    /// Create a job config with defaults for everything but name and kind.
    pub fn new(name: impl Into<String>, kind: JobKind) -> Self {
        Self {
            name: name.into(),
            kind,
            provider: default_provider(),
            central_region: default_central_region(),
            regions: Vec::new(),
            full_resync_interval_secs: default_full_resync_interval_secs(),
            chunk_size: default_chunk_size(),
            retry: RetryConfig::default(),
            query: QueryConfig::default(),
            paging: PagingConfig::default(),
            fields: TenantFieldMapping::default(),
            moved_fields: MovedSubaccountFieldMapping::default(),
        }
    }

    /// Get the full resync interval as Duration.
    #[must_use]
    pub fn full_resync_interval(&self) -> Duration {
        Duration::from_secs(self.full_resync_interval_secs)
    }

    /// Look up a configured region by its API name.
    #[must_use]
    pub fn region(&self, name: &str) -> Option<&RegionConfig> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Check if this configuration is valid.
    pub fn validate(&self) -> SyncResult<()> {
        if self.name.trim().is_empty() {
            return Err(SyncError::configuration("Job name must not be empty"));
        }
        if self.provider.trim().is_empty() {
            return Err(SyncError::configuration("Provider must not be empty"));
        }
        if self.chunk_size == 0 {
            return Err(SyncError::configuration(
                "Chunk size must be at least 1",
            ));
        }
        if self.retry.attempts == 0 {
            return Err(SyncError::configuration(
                "Retry attempts must be at least 1",
            ));
        }
        if self.full_resync_interval_secs == 0 {
            return Err(SyncError::configuration(
                "Full resync interval must be at least 1 second",
            ));
        }
        if self.query.page_start_value.parse::<i64>().is_err() {
            return Err(SyncError::configuration(format!(
                "Page start value '{}' is not a number",
                self.query.page_start_value
            )));
        }
        if self.fields.discriminator_field.is_some() != self.fields.discriminator_value.is_some() {
            return Err(SyncError::configuration(
                "Discriminator field and value must be set together",
            ));
        }
        if self.kind == JobKind::Subaccount && self.regions.is_empty() {
            return Err(SyncError::configuration(
                "Subaccount job requires at least one region",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncJobConfig::new("accounts", JobKind::GlobalAccount);
        assert_eq!(config.provider, "external-provider");
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.retry.attempts, 7);
        assert_eq!(config.retry.delay_ms, 100);
        assert_eq!(config.full_resync_interval(), Duration::from_secs(43_200));
        assert_eq!(config.query.page_start_value, "1");
        assert_eq!(config.query.page_size_value, "150");
        assert_eq!(config.fields.global_account_key, "gaID");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "name": "subaccounts",
            "kind": "subaccount",
            "regions": [{"name": "eu10", "prefix": "cf-"}],
            "chunk_size": 50
        }"#;
        let config: SyncJobConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind, JobKind::Subaccount);
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.regions[0].full_name(), "cf-eu10");
        assert!(config.regions[0].universal_client_enabled);
        assert_eq!(config.paging.events_field, "events");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SyncJobConfig::new("accounts", JobKind::GlobalAccount);
        config.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = SyncJobConfig::new("accounts", JobKind::GlobalAccount);
        config.query.page_start_value = "first".into();
        assert!(config.validate().is_err());

        let mut config = SyncJobConfig::new("accounts", JobKind::GlobalAccount);
        config.fields.discriminator_field = Some("licenseType".into());
        assert!(config.validate().is_err());

        let config = SyncJobConfig::new("subaccounts", JobKind::Subaccount);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_job_kind_from_str() {
        assert_eq!("subaccount".parse::<JobKind>(), Ok(JobKind::Subaccount));
        assert_eq!(
            "global_account".parse::<JobKind>(),
            Ok(JobKind::GlobalAccount)
        );
        assert!("region".parse::<JobKind>().is_err());
    }
}
