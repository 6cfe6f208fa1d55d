//! # Tenant Hierarchy Sync
//!
//! Reconciles the customer → account → subaccount tenant tree of the
//! platform of record with an upstream provisioning-events API.
//!
//! This crate provides:
//! - Paged, retried event fetching with total-count consistency checks
//! - Decoding of account, subaccount and move events into tenant records
//! - Hierarchy building: dedupe, delete exclusion, parent synthesis and
//!   internal-ID resolution
//! - Chunked writes through the director GraphQL API
//! - Subaccount moves guarded by runtime scenario assignments
//! - Watermark-driven full and incremental resync windows
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   pages   ┌──────────────┐  records  ┌────────────────────┐
//! │ EventApi     │──────────►│ EventFetcher │──────────►│ ResyncOrchestrator │
//! │ (per region) │           │ (walk+retry) │           │                    │
//! └──────────────┘           └──────────────┘           └─────────┬──────────┘
//!                                                                 │
//!              ┌──────────────────────┬─────────────────────┬─────┴──────────┐
//!              ▼                      ▼                     ▼                ▼
//!       ┌─────────────┐      ┌────────────────┐     ┌──────────────┐  ┌─────────────┐
//!       │ hierarchy   │      │ TenantStorage  │     │ MoveProcessor│  │ Watermark   │
//!       │ (pure)      │      │ (read-only tx) │     │              │  │ Store       │
//!       └─────────────┘      └────────────────┘     └──────┬───────┘  └─────────────┘
//!                                                          ▼
//!                                                ┌─────────────────────┐
//!                                                │ DirectorWriteClient │
//!                                                └─────────────────────┘
//! ```

pub mod chunk;
pub mod config;
pub mod director;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod hierarchy;
pub mod migrations;
pub mod model;
pub mod mover;
pub mod orchestrator;
pub mod retry;
pub mod storage;
pub mod watermark;

pub use config::{JobKind, RegionConfig, SyncJobConfig};
pub use director::{DirectorWriteClient, HttpDirectorClient};
pub use error::{SyncError, SyncResult};
pub use events::{EventApiClient, EventKind, HttpEventApiClient};
pub use fetcher::EventFetcher;
pub use migrations::run_migrations;
pub use model::{MoveRecord, StoredTenant, TenantRecord, TenantType, TenantWriteInput, Watermark};
pub use mover::{MoveOutcome, MoveProcessor};
pub use orchestrator::{OnDemandOutcome, PassReport, RegionReport, ResyncOrchestrator, SyncOutcome, SyncScope};
pub use retry::RetryPolicy;
pub use storage::{LabelRepository, RuntimeService, TenantStorage};
pub use watermark::{Clock, SystemClock, WatermarkStore};
