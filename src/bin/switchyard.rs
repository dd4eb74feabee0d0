//! Runs the connector sync service.
//!
//! Configuration comes from the environment or matching long flags (see
//! [`switchyard::config::SyncConfig`]). The service optionally runs one pass
//! at startup, then refreshes on a jittered timer until interrupted.

use mockable::DefaultClock;
use std::sync::Arc;
use switchyard::config::{ConfigError, SyncConfig};
use switchyard::manifest::{
    adapters::{HmacManifestVerifier, HttpManifestSource, UnverifiedManifests},
    domain::SignatureError,
    ports::ManifestVerifier,
    services::ManifestCache,
};
use switchyard::sync::{RefreshScheduler, SchedulerError, SyncCoordinator, SyncDependencies};
use switchyard::telemetry::init_tracing;
use switchyard::tool_registry::{
    adapters::{FileRegistryStore, HttpConnectorHost},
    ports::PersistenceError,
    services::{RegistryPersistence, ToolRegistry},
};
use thiserror::Error;
use tracing::{error, info, warn};

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that stop the service during startup.
#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to initialise logging: {0}")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error(transparent)]
    SignatureKey(#[from] SignatureError),
    #[error("registry persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

fn build_verifier(config: &SyncConfig) -> Result<Arc<dyn ManifestVerifier>, StartupError> {
    match &config.signature_key {
        Some(key) => Ok(Arc::new(HmacManifestVerifier::new(key.clone())?)),
        None => {
            warn!("manifest signature verification is disabled");
            Ok(Arc::new(UnverifiedManifests))
        }
    }
}

fn build_client(config: &SyncConfig) -> Result<reqwest::Client, StartupError> {
    Ok(reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_size)
        .connect_timeout(config.fetch_timeout)
        .timeout(config.fetch_timeout)
        .build()?)
}

async fn run(config: SyncConfig) -> Result<(), StartupError> {
    let client = build_client(&config)?;
    let verifier = build_verifier(&config)?;
    let clock = Arc::new(DefaultClock);

    let source = Arc::new(HttpManifestSource::new(
        client.clone(),
        config.service_map_url.clone(),
        verifier,
        config.fetch_timeout,
    ));
    let host = Arc::new(HttpConnectorHost::new(client));
    let store = Arc::new(FileRegistryStore::new(&config.registry_path)?);
    let persistence =
        Arc::new(RegistryPersistence::open(store, config.flush_interval).await?);

    let coordinator = Arc::new(SyncCoordinator::new(
        SyncDependencies {
            source,
            cache: Arc::new(ManifestCache::new(Arc::clone(&clock))),
            host,
            clock,
            registry: Arc::new(ToolRegistry::new()),
            persistence: Arc::clone(&persistence),
        },
        config.sync_settings(),
    ));

    if config.refresh_sync {
        let summary = coordinator.run().await;
        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            manifest = %summary.manifest,
            "startup sync finished"
        );
    }

    let ticking = Arc::clone(&coordinator);
    let scheduler = RefreshScheduler::start(
        config.refresh_interval,
        config.refresh_jitter,
        move || {
            let pass = Arc::clone(&ticking);
            async move {
                let _summary = pass.run().await;
            }
        },
    )?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    scheduler.stop().await;
    scheduler.wait_idle().await;
    coordinator.shutdown().await;
    if let Err(err) = persistence.close().await {
        error!(error = %err, "final registry flush failed");
        return Err(err.into());
    }
    info!("switchyard stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = match SyncConfig::from_args(std::env::args_os()) {
        Ok(config) => config,
        Err(ConfigError::Arguments(err)) => err.exit(),
        Err(err) => return Err(StartupError::from(err).into()),
    };
    init_tracing(config.log_format).map_err(StartupError::from)?;
    info!(
        service_map_url = %config.service_map_url,
        registry_path = %config.registry_path,
        "starting switchyard"
    );
    run(config).await.map_err(Into::into)
}
