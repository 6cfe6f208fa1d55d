//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: required variables must be present and every
//! present variable must parse, or the process exits with a clear message.
//! The job itself is described by a [`SyncJobConfig`], either built from the
//! individual `APP_*` variables or given whole as JSON in
//! `APP_SYNC_JOB_CONFIG_JSON` (needed for custom field mappings).

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use tenancy_sync::config::{JobKind, RegionConfig, SyncJobConfig};
use tenancy_sync::events::EventKind;
use thiserror::Error;

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

impl ConfigError {
    fn invalid(var: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.to_string(),
            message: message.into(),
        }
    }
}

/// Events API endpoints, one URL per event kind.
pub type EventEndpoints = HashMap<EventKind, String>;

/// Tenant fetcher configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,

    /// Director GraphQL endpoint receiving tenant writes.
    pub director_endpoint: String,
    pub director_token: Option<String>,

    /// Endpoints of the universal events client.
    pub events_endpoints: EventEndpoints,
    /// Endpoints of dedicated per-region events clients.
    pub regional_events_endpoints: HashMap<String, EventEndpoints>,
    pub events_token: Option<String>,

    pub request_timeout: Duration,
    /// Delay between two passes of the scheduled job.
    pub job_interval: Duration,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,

    pub job: SyncJobConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing, a value does
    /// not parse, or the resulting job configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let job = match vars.get("APP_SYNC_JOB_CONFIG_JSON") {
            Some(json) => serde_json::from_str::<SyncJobConfig>(&json)
                .map_err(|e| ConfigError::invalid("APP_SYNC_JOB_CONFIG_JSON", e.to_string()))?,
            None => job_from_vars(&vars)?,
        };
        job.validate()
            .map_err(|e| ConfigError::invalid("APP_SYNC_JOB_CONFIG_JSON", e.to_string()))?;

        let events_endpoints = events_endpoints_from_vars(&vars);
        for kind in required_kinds(job.kind) {
            if !events_endpoints.contains_key(kind) {
                return Err(ConfigError::MissingVar(endpoint_var(*kind)));
            }
        }

        let regional_events_endpoints = match vars.get("APP_REGIONAL_EVENTS_ENDPOINTS") {
            Some(json) => parse_regional_endpoints(&json)?,
            None => HashMap::new(),
        };

        Ok(Self {
            database_url: vars.required("APP_DATABASE_URL")?,
            db_max_connections: vars.parse_or("APP_DB_MAX_CONNECTIONS", 5)?,
            director_endpoint: vars.required("APP_DIRECTOR_GRAPHQL_ENDPOINT")?,
            director_token: vars.get("APP_DIRECTOR_TOKEN"),
            events_endpoints,
            regional_events_endpoints,
            events_token: vars.get("APP_EVENTS_BEARER_TOKEN"),
            request_timeout: Duration::from_secs(vars.parse_or("APP_REQUEST_TIMEOUT_SECS", 30)?),
            job_interval: Duration::from_secs(vars.parse_or("APP_JOB_INTERVAL_SECS", 60)?),
            log_level: vars.get("APP_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            job,
        })
    }
}

/// Environment lookup with typed accessors. Empty values count as unset.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string())),
            None => Ok(default),
        }
    }
}

fn job_from_vars<F>(vars: &Vars<F>) -> Result<SyncJobConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let kind = match vars.get("APP_JOB_KIND") {
        Some(raw) => raw
            .parse::<JobKind>()
            .map_err(|e| ConfigError::invalid("APP_JOB_KIND", e))?,
        None => JobKind::Subaccount,
    };
    let name = vars
        .get("APP_JOB_NAME")
        .unwrap_or_else(|| format!("{kind}-fetcher"));

    let mut job = SyncJobConfig::new(name, kind);
    if let Some(provider) = vars.get("APP_PROVIDER") {
        job.provider = provider;
    }
    if let Some(central) = vars.get("APP_CENTRAL_REGION") {
        job.central_region = central;
    }
    if let Some(raw) = vars.get("APP_REGIONS") {
        let prefix = vars.get("APP_REGION_PREFIX").unwrap_or_default();
        job.regions = parse_regions(&raw, &prefix)?;
    }
    job.full_resync_interval_secs =
        vars.parse_or("APP_FULL_RESYNC_INTERVAL_SECS", job.full_resync_interval_secs)?;
    job.chunk_size = vars.parse_or("APP_CHUNK_SIZE", job.chunk_size)?;
    job.retry.attempts = vars.parse_or("APP_RETRY_ATTEMPTS", job.retry.attempts)?;
    job.retry.delay_ms = vars.parse_or("APP_RETRY_DELAY_MS", job.retry.delay_ms)?;
    job.query.page_size_value = vars.parse_or("APP_PAGE_SIZE", job.query.page_size_value)?;
    Ok(job)
}

/// Regions as a JSON list of [`RegionConfig`] or as comma-separated names
/// sharing `prefix`.
fn parse_regions(raw: &str, prefix: &str) -> Result<Vec<RegionConfig>, ConfigError> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str(raw)
            .map_err(|e| ConfigError::invalid("APP_REGIONS", e.to_string()));
    }
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| RegionConfig::new(name, prefix))
        .collect())
}

fn endpoint_var(kind: EventKind) -> String {
    format!("APP_EVENTS_{}_URL", kind.as_str().to_uppercase())
}

fn events_endpoints_from_vars<F>(vars: &Vars<F>) -> EventEndpoints
where
    F: Fn(&str) -> Option<String>,
{
    EventKind::ALL
        .into_iter()
        .filter_map(|kind| vars.get(&endpoint_var(kind)).map(|url| (kind, url)))
        .collect()
}

fn required_kinds(kind: JobKind) -> &'static [EventKind] {
    match kind {
        JobKind::GlobalAccount => &[
            EventKind::CreatedAccount,
            EventKind::UpdatedAccount,
            EventKind::DeletedAccount,
        ],
        JobKind::Subaccount => &[
            EventKind::CreatedSubaccount,
            EventKind::UpdatedSubaccount,
            EventKind::DeletedSubaccount,
            EventKind::MovedSubaccount,
        ],
    }
}

/// `{"<region>": {"<event_kind>": "<url>"}}`
fn parse_regional_endpoints(raw: &str) -> Result<HashMap<String, EventEndpoints>, ConfigError> {
    const VAR: &str = "APP_REGIONAL_EVENTS_ENDPOINTS";

    let parsed: HashMap<String, HashMap<String, String>> =
        serde_json::from_str(raw).map_err(|e| ConfigError::invalid(VAR, e.to_string()))?;

    parsed
        .into_iter()
        .map(|(region, endpoints)| {
            let endpoints = endpoints
                .into_iter()
                .map(|(kind, url)| {
                    kind.parse::<EventKind>()
                        .map(|kind| (kind, url))
                        .map_err(|e| ConfigError::invalid(VAR, e))
                })
                .collect::<Result<EventEndpoints, _>>()?;
            Ok((region, endpoints))
        })
        .collect()
}
