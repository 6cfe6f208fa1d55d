//! Upstream provisioning-events API: page model, decoding, and walking.
//!
//! ```text
//!  EventApiClient ──fetch_page──► EventsPage ──► PageWalker (totals check)
//!                                     │
//!                                     ▼
//!                               EventDecoder ──► TenantRecord / MoveRecord
//! ```

pub mod client;
pub mod decoder;
pub mod walker;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncResult;

pub use client::HttpEventApiClient;
pub use decoder::EventDecoder;
pub use walker::PageWalker;

/// Query parameters sent with one page request.
pub type QueryParams = BTreeMap<String, String>;

/// Kind of tenant lifecycle event, each served by its own endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    CreatedAccount,
    UpdatedAccount,
    DeletedAccount,
    CreatedSubaccount,
    UpdatedSubaccount,
    DeletedSubaccount,
    MovedSubaccount,
}

impl EventKind {
    /// Every event kind.
    pub const ALL: [EventKind; 7] = [
        EventKind::CreatedAccount,
        EventKind::UpdatedAccount,
        EventKind::DeletedAccount,
        EventKind::CreatedSubaccount,
        EventKind::UpdatedSubaccount,
        EventKind::DeletedSubaccount,
        EventKind::MovedSubaccount,
    ];

    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CreatedAccount => "created_account",
            EventKind::UpdatedAccount => "updated_account",
            EventKind::DeletedAccount => "deleted_account",
            EventKind::CreatedSubaccount => "created_subaccount",
            EventKind::UpdatedSubaccount => "updated_subaccount",
            EventKind::DeletedSubaccount => "deleted_subaccount",
            EventKind::MovedSubaccount => "moved_subaccount",
        }
    }

    /// Whether the discriminator filter applies to this kind.
    #[must_use]
    pub fn is_account_creation(&self) -> bool {
        matches!(self, EventKind::CreatedAccount)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("Unknown event kind: {s}"))
    }
}

/// One raw page returned by the events API.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsPage {
    pub payload: Value,
}

impl EventsPage {
    /// Wrap a decoded JSON payload.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// Parse a page from a raw response body.
    pub fn from_slice(body: &[u8]) -> SyncResult<Self> {
        Ok(Self::new(serde_json::from_slice(body)?))
    }

    /// Look up a dotted path (`"meta.total"`) in the payload.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.payload, path)
    }

    /// Read an integer at a dotted path; missing or non-numeric values read as 0.
    #[must_use]
    pub fn get_i64(&self, path: &str) -> i64 {
        match self.get(path) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }
}

/// Resolve a dotted path inside a JSON value.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let pointer: String = path
        .split('.')
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect();
    value.pointer(&pointer)
}

/// Source of raw events pages.
#[async_trait]
pub trait EventApiClient: Send + Sync {
    /// Fetch one page of events of the given kind.
    ///
    /// `Ok(None)` means the API had no data for this query.
    async fn fetch_page(&self, kind: EventKind, params: &QueryParams)
        -> SyncResult<Option<EventsPage>>;
}
