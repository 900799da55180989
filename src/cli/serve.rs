use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::config::AppConfig;
use crate::core::dispatcher::ActionDispatcher;
use crate::core::executor::TaskExecutor;
use crate::core::invoker::ProcessInvoker;
use crate::core::lifecycle::LifecycleManager;
use crate::core::store::Store;
use crate::core::terminal;
use crate::core::tracker::Tracker;
use crate::interfaces::discord::{ChatSupervisor, default_handlers};
use crate::interfaces::web::{ApiServer, ApiServerConfig};
use crate::logging;

/// The storage and execution stack shared by `serve` and the one-shot commands.
pub(crate) struct Services {
    pub store: Store,
    pub tracker: Tracker,
    pub dispatcher: ActionDispatcher,
}

impl Services {
    pub(crate) async fn open(config: &AppConfig) -> Result<Self> {
        let store = Store::open(&config.data_dir, &config.database_file).await?;
        let invoker = ProcessInvoker::new(config.agent_binary.clone());
        let tracker = Tracker::new(store.clone(), TaskExecutor::new(Arc::new(invoker)));
        let dispatcher = ActionDispatcher::new(store.clone(), tracker.clone());
        Ok(Self {
            store,
            tracker,
            dispatcher,
        })
    }
}

pub async fn run_serve(config: AppConfig) -> Result<()> {
    let log_tx = logging::init_logging(config.max_log_level());
    info!(
        "Starting taskrelay {} (data dir {})",
        env!("CARGO_PKG_VERSION"),
        config.data_dir.display()
    );

    let services = Services::open(&config).await?;
    let supervisor = ChatSupervisor::spawn(
        config.discord_token.clone(),
        default_handlers(services.store.clone(), services.dispatcher.clone()),
        config.discord_autostart,
    );
    let api = ApiServer::new(ApiServerConfig {
        store: services.store.clone(),
        tracker: services.tracker.clone(),
        dispatcher: services.dispatcher.clone(),
        supervisor: supervisor.clone(),
        log_tx,
        webhook_secret: config.webhook_secret.clone(),
        api_host: config.api_host.clone(),
        api_port: config.api_port,
    });

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(services.store.clone())));
    lifecycle.attach(Arc::new(Mutex::new(supervisor)));
    lifecycle.attach(Arc::new(Mutex::new(api)));

    if let Err(e) = lifecycle.start().await {
        lifecycle.shutdown().await?;
        return Err(e);
    }
    info!("taskrelay is {:?}", lifecycle.state());

    terminal::print_link(
        "API",
        &format!("http://{}:{}/api", config.api_host, config.api_port),
    );
    terminal::print_status("Agent", &config.agent_binary);
    terminal::print_status("Database", &config.database_path().display().to_string());
    if config.discord_token.is_none() {
        terminal::print_warn("No Discord token configured; chat triggers are inactive.");
    }
    terminal::print_info("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}
