mod handlers;
mod router;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::core::dispatcher::ActionDispatcher;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::Store;
use crate::core::tracker::Tracker;
use crate::interfaces::discord::ChatSupervisor;

pub use router::build_api_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Store,
    pub(crate) tracker: Tracker,
    pub(crate) dispatcher: ActionDispatcher,
    pub(crate) supervisor: ChatSupervisor,
    pub(crate) log_tx: broadcast::Sender<String>,
    pub(crate) webhook_secret: Option<String>,
    pub(crate) api_port: u16,
}

pub struct ApiServerConfig {
    pub store: Store,
    pub tracker: Tracker,
    pub dispatcher: ActionDispatcher,
    pub supervisor: ChatSupervisor,
    pub log_tx: broadcast::Sender<String>,
    pub webhook_secret: Option<String>,
    pub api_host: String,
    pub api_port: u16,
}

pub struct ApiServer {
    state: AppState,
    api_host: String,
    server: Option<tokio::task::JoinHandle<()>>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            state: AppState {
                store: config.store,
                tracker: config.tracker,
                dispatcher: config.dispatcher,
                supervisor: config.supervisor,
                log_tx: config.log_tx,
                webhook_secret: config.webhook_secret,
                api_port: config.api_port,
            },
            api_host: config.api_host,
            server: None,
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
        let addr = format!("{}:{}", self.api_host, self.state.api_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("Could not bind API server to {}: {}", addr, e))?;
        let app = router::build_api_router(self.state.clone());

        info!("API Server running at http://{addr}");
        self.server = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API Server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        if let Some(server) = self.server.take() {
            server.abort();
        }
        Ok(())
    }
}
