mod auth;
mod error;
mod handlers;
mod router;

pub(crate) use auth::is_loopback as is_loopback_host;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use chrono::{DateTime, Utc};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::consolidator::Consolidator;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::TrackStore;
use crate::core::supervisor::Supervisor;

const SHUTDOWN_DRAIN: std::time::Duration = std::time::Duration::from_secs(3);

pub struct ApiServer {
    state: AppState,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

pub struct ApiServerConfig {
    pub store: Arc<TrackStore>,
    pub consolidator: Arc<Consolidator>,
    pub supervisor: Arc<Supervisor>,
    pub log_tx: broadcast::Sender<String>,
    pub api_host: String,
    pub api_port: u16,
    pub admin_token: Option<String>,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<TrackStore>,
    pub(crate) consolidator: Arc<Consolidator>,
    pub(crate) supervisor: Arc<Supervisor>,
    pub(crate) log_tx: broadcast::Sender<String>,
    pub(crate) api_host: String,
    pub(crate) api_port: u16,
    pub(crate) admin_token: Option<String>,
    pub(crate) started_at: DateTime<Utc>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            state: AppState {
                store: config.store,
                consolidator: config.consolidator,
                supervisor: config.supervisor,
                log_tx: config.log_tx,
                api_host: config.api_host,
                api_port: config.api_port,
                admin_token: config.admin_token.filter(|t| !t.trim().is_empty()),
                started_at: Utc::now(),
            },
            shutdown: CancellationToken::new(),
            handle: None,
        }
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(log) => Ok(Event::default().data(log)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.state.api_host, self.state.api_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind API server to {}", addr))?;
        let app = router::build_api_router(self.state.clone());
        let shutdown = self.shutdown.clone();

        info!("API Server running at http://{addr}");
        self.handle = Some(tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!("API Server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            // Open SSE subscribers would hold graceful shutdown forever.
            if tokio::time::timeout(SHUTDOWN_DRAIN, handle).await.is_err() {
                tracing::warn!("API Server did not drain within {:?}", SHUTDOWN_DRAIN);
            }
        }
        Ok(())
    }
}
