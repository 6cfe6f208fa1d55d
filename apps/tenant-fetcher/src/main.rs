//! Tenant fetcher
//!
//! Keeps the tenant hierarchy of the director in sync with the upstream
//! provisioning-events API. Runs one configured job (global accounts or
//! subaccounts) on a fixed interval, a single pass, or an on-demand sync of
//! one subaccount.

mod config;
mod error;
mod logging;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::{AppConfig, EventEndpoints};
use error::{AppError, AppResult};
use logging::LogFormat;
use tenancy_sync::director::{DirectorWriteClient, HttpDirectorClient};
use tenancy_sync::events::HttpEventApiClient;
use tenancy_sync::storage::{PgLabelRepository, PgRuntimeService, PgTenantStorage, TenantStorage};
use tenancy_sync::watermark::PgWatermarkStore;
use tenancy_sync::{
    run_migrations, EventFetcher, JobKind, MoveProcessor, ResyncOrchestrator, SyncError,
    SyncOutcome, SyncScope,
};

/// Tenant hierarchy fetcher
#[derive(Parser)]
#[command(name = "tenant-fetcher")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Run the configured job on its interval until interrupted (default)
    Run,

    /// Run a single pass of the configured job
    Once,

    /// Synchronize one subaccount on demand
    SyncTenant {
        /// External ID of the subaccount
        tenant_id: String,

        /// Parent used when no creation event exists yet (internal ID)
        parent_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Fail fast on missing or invalid configuration
    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", AppError::from(e));
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.log_level, cli.log_format);

    if let Err(e) = run(cli, config).await {
        error!(error = %e, "Tenant fetcher stopped with an error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: AppConfig) -> AppResult<()> {
    info!(
        job = %config.job.name,
        kind = %config.job.kind,
        regions = config.job.regions.len(),
        "Starting tenant fetcher"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.request_timeout)
        .connect(&config.database_url)
        .await?;
    run_migrations(&pool).await?;

    let orchestrator = build_orchestrator(&config, pool)?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_scheduled(&orchestrator, config.job_interval, &cancel).await,
        Command::Once => {
            let scope = SyncScope::for_job(orchestrator.config());
            orchestrator.run(&scope, &cancel).await?;
            Ok(())
        }
        Command::SyncTenant {
            tenant_id,
            parent_id,
        } => {
            let scope = SyncScope::SingleSubaccount {
                external_id: tenant_id,
                parent_id,
            };
            if let SyncOutcome::OnDemand(outcome) = orchestrator.run(&scope, &cancel).await? {
                info!(outcome = ?outcome, "On-demand sync finished");
            }
            Ok(())
        }
    }
}

/// Run passes on a fixed interval. A failed pass is logged and retried on the
/// next tick with the same window.
async fn run_scheduled(
    orchestrator: &ResyncOrchestrator,
    interval: std::time::Duration,
    cancel: &CancellationToken,
) -> AppResult<()> {
    let scope = SyncScope::for_job(orchestrator.config());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Failures are logged by the orchestrator
        if let Err(SyncError::Cancelled) = orchestrator.run(&scope, cancel).await {
            break;
        }
    }

    info!(job = %orchestrator.config().name, "Tenant fetcher stopped");
    Ok(())
}

fn build_orchestrator(config: &AppConfig, pool: PgPool) -> AppResult<ResyncOrchestrator> {
    let universal = events_client(config, &config.events_endpoints)?;
    let mut fetcher = EventFetcher::for_job(&config.job, Arc::new(universal));
    for (region, endpoints) in &config.regional_events_endpoints {
        if config.job.region(region).is_none() {
            warn!(region = %region, "Regional events client configured for an unknown region");
        }
        fetcher = fetcher.with_regional_client(region, Arc::new(events_client(config, endpoints)?));
    }

    let mut director = HttpDirectorClient::new(&config.director_endpoint, config.request_timeout)?;
    if let Some(token) = &config.director_token {
        director = director.with_bearer_token(token);
    }
    let director: Arc<dyn DirectorWriteClient> = Arc::new(director);
    let storage: Arc<dyn TenantStorage> = Arc::new(PgTenantStorage::new(pool.clone()));
    let watermarks = Arc::new(PgWatermarkStore::new(pool.clone(), &config.job.name));

    let orchestrator = ResyncOrchestrator::new(
        config.job.clone(),
        fetcher,
        Arc::clone(&storage),
        Arc::clone(&director),
        watermarks,
    );

    Ok(match config.job.kind {
        JobKind::GlobalAccount => orchestrator,
        JobKind::Subaccount => orchestrator.with_move_processor(MoveProcessor::new(
            storage,
            director,
            Arc::new(PgRuntimeService::new(pool.clone())),
            Arc::new(PgLabelRepository::new(pool)),
            &config.job.provider,
        )),
    })
}

fn events_client(config: &AppConfig, endpoints: &EventEndpoints) -> AppResult<HttpEventApiClient> {
    let mut client = HttpEventApiClient::new(config.request_timeout)?;
    for (kind, url) in endpoints {
        client = client.with_endpoint(*kind, url);
    }
    if let Some(token) = &config.events_token {
        client = client.with_bearer_token(token);
    }
    Ok(client)
}

async fn cancel_on_shutdown(cancel: CancellationToken) {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received, cancelling current pass");
    cancel.cancel();
}
