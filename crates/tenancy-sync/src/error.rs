//! Error types for the tenant synchronization engine.

use thiserror::Error;

/// Errors that can occur while synchronizing the tenant hierarchy.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The events API answered with a non-success status.
    #[error("Events API returned status {status}: {message}")]
    EventApi { status: u16, message: String },

    /// The total result count changed between pages of one query.
    #[error("total results changed from {expected} to {actual} while walking event pages")]
    TotalChanged { expected: i64, actual: i64 },

    /// A page that the page count promised came back empty.
    #[error("next page {page} was expected but response was empty")]
    MissingPage { page: i64 },

    /// A raw event or page could not be decoded.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// The write API rejected a request.
    #[error("Director error: {message}")]
    Director { message: String },

    /// Storage read failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure.
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Watermark could not be read or persisted.
    #[error("Watermark error: {message}")]
    Watermark { message: String },

    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A move was refused because the source still holds scenario assignments.
    #[error("cannot move subaccount {subaccount}: runtime {runtime_id} is in scenario '{scenario}' of tenant {source_tenant}")]
    MovePrecondition {
        subaccount: String,
        source_tenant: String,
        runtime_id: String,
        scenario: String,
    },

    /// More than one creation event matched a single entity.
    #[error("expected one create event for tenant with ID {external_id}, found {count}")]
    Ambiguous { external_id: String, count: usize },

    /// A tenant expected to exist in storage could not be found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller cancelled the pass.
    #[error("Synchronization cancelled")]
    Cancelled,
}

impl SyncError {
    /// Create an events API error.
    pub fn event_api(status: u16, message: impl Into<String>) -> Self {
        Self::EventApi {
            status,
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a write API error.
    pub fn director(message: impl Into<String>) -> Self {
        Self::Director {
            message: message.into(),
        }
    }

    /// Create a watermark error.
    pub fn watermark(message: impl Into<String>) -> Self {
        Self::Watermark {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Check if the error is transient and the operation may be retried.
    ///
    /// Consistency violations of a page walk are never retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::EventApi { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Check if the error is a consistency violation of a page walk.
    #[must_use]
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::TotalChanged { .. } | Self::MissingPage { .. })
    }

    /// Check if the error only concerns a single move.
    #[must_use]
    pub fn is_move_precondition(&self) -> bool {
        matches!(self, Self::MovePrecondition { .. })
    }
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;
