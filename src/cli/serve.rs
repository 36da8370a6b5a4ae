use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::core::config::TrackdConfig;
use crate::core::consolidator::Consolidator;
use crate::core::lifecycle::LifecycleManager;
use crate::core::store::{RetentionPolicy, TrackStore};
use crate::core::supervisor::{Supervisor, SupervisorService};
use crate::core::terminal;
use crate::interfaces::web::{ApiServer, ApiServerConfig, is_loopback_host};
use crate::logging::init_daemon_logging;

pub async fn run_daemon(config: TrackdConfig, api_host: String, api_port: u16) -> Result<()> {
    let log_tx = init_daemon_logging(&config.logging.level);
    let has_token = config
        .api
        .admin_token
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    if !has_token && !is_loopback_host(&api_host) {
        terminal::print_warn(&format!(
            "API bound to {} without api.admin_token; admin routes will refuse every request.",
            api_host
        ));
    }
    info!("Starting trackd {}...", env!("CARGO_PKG_VERSION"));

    let data_dir = config.resolved_data_dir();
    let store = Arc::new(
        TrackStore::open(&data_dir, config.registry())
            .await
            .with_context(|| format!("failed to open track store at {}", data_dir.display()))?,
    );

    let consolidator = Arc::new(Consolidator::new(
        store.clone(),
        config.consolidator.clone(),
    ));
    let supervisor = Arc::new(Supervisor::new(
        config.workers.clone(),
        config.supervisor_settings(&data_dir),
    ));

    let mut lifecycle = LifecycleManager::new().await?;

    let api = ApiServer::new(ApiServerConfig {
        store: store.clone(),
        consolidator,
        supervisor: supervisor.clone(),
        log_tx,
        api_host,
        api_port,
        admin_token: config.api.admin_token.clone(),
    });
    lifecycle.attach(Arc::new(Mutex::new(api)));
    lifecycle.attach(Arc::new(Mutex::new(SupervisorService::new(supervisor))));

    if let Some(schedule) = config.retention.schedule.as_deref() {
        schedule_retention(&mut lifecycle, store, schedule, config.retention.keep_days).await?;
    }

    if let Err(e) = lifecycle.start().await {
        error!("Startup failed: {}", e);
        lifecycle.shutdown().await?;
        return Err(e);
    }
    info!(
        "trackd is running ({:?}). Press Ctrl+C to stop.",
        lifecycle.state()
    );

    wait_for_shutdown_signal().await?;
    info!("Shutting down trackd...");
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}

async fn schedule_retention(
    lifecycle: &mut LifecycleManager,
    store: Arc<TrackStore>,
    schedule: &str,
    keep_days: u32,
) -> Result<()> {
    let job = tokio_cron_scheduler::Job::new_async(schedule, move |_uuid, mut _l| {
        let store = store.clone();
        Box::pin(async move {
            match store.cleanup(RetentionPolicy::KeepDays(keep_days)).await {
                Ok(deleted) => info!(
                    "Scheduled retention removed {} snapshot(s)",
                    deleted.values().sum::<usize>()
                ),
                Err(e) => error!("Scheduled retention failed: {}", e),
            }
        })
    })
    .with_context(|| format!("invalid retention schedule '{}'", schedule))?;

    lifecycle.scheduler.add(job).await?;
    info!(
        "Retention scheduled ({}), keeping {} day(s) of history",
        schedule, keep_days
    );
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
