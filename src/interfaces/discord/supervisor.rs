use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serenity::Client;
use serenity::all::{GatewayIntents, ShardManager};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::connection::{ChatConnection, SerenityConnection};
use super::events::{GatewayHandler, HandlerTable};
use crate::core::lifecycle::LifecycleComponent;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BotStatus {
    pub running: bool,
    pub token_configured: bool,
}

enum Command {
    Start(oneshot::Sender<Result<BotStatus>>),
    Stop(oneshot::Sender<BotStatus>),
    Status(oneshot::Sender<BotStatus>),
    Connection(oneshot::Sender<Option<Arc<dyn ChatConnection>>>),
}

struct RunningBot {
    shard_manager: Arc<ShardManager>,
    handle: JoinHandle<()>,
    conn: Arc<dyn ChatConnection>,
}

/// State owned by the supervisor task. Nothing else touches the client.
struct BotOwner {
    token: Option<String>,
    table: Arc<HandlerTable>,
    running: Option<RunningBot>,
}

impl BotOwner {
    fn status(&mut self) -> BotStatus {
        if self
            .running
            .as_ref()
            .is_some_and(|bot| bot.handle.is_finished())
        {
            warn!("Discord client exited on its own");
            self.running = None;
        }
        BotStatus {
            running: self.running.is_some(),
            token_configured: self.token.is_some(),
        }
    }

    async fn start(&mut self) -> Result<BotStatus> {
        if self.status().running {
            return Ok(self.status());
        }
        let token = self
            .token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Discord token is not configured"))?;

        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_MESSAGE_REACTIONS
            | GatewayIntents::DIRECT_MESSAGE_REACTIONS;

        let mut client = Client::builder(&token, intents)
            .event_handler(GatewayHandler::new(self.table.clone()))
            .await?;
        let shard_manager = client.shard_manager.clone();
        let conn: Arc<dyn ChatConnection> =
            Arc::new(SerenityConnection::new(client.http.clone(), None));
        let handle = tokio::spawn(async move {
            if let Err(why) = client.start().await {
                error!("Discord client error: {:?}", why);
            }
        });
        info!("Discord client started");

        self.running = Some(RunningBot {
            shard_manager,
            handle,
            conn,
        });
        Ok(self.status())
    }

    async fn stop(&mut self) -> BotStatus {
        if let Some(bot) = self.running.take() {
            bot.shard_manager.shutdown_all().await;
            bot.handle.abort();
            info!("Discord client stopped");
        }
        self.status()
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Start(reply) => {
                    let _ = reply.send(self.start().await);
                }
                Command::Stop(reply) => {
                    let _ = reply.send(self.stop().await);
                }
                Command::Status(reply) => {
                    let _ = reply.send(self.status());
                }
                Command::Connection(reply) => {
                    // status() drops a client that exited on its own
                    self.status();
                    let _ = reply.send(self.running.as_ref().map(|bot| bot.conn.clone()));
                }
            }
        }
        self.stop().await;
    }
}

/// Handle to the task that owns the chat client. Cloneable; all clones talk
/// to the same owner.
#[derive(Clone)]
pub struct ChatSupervisor {
    tx: mpsc::Sender<Command>,
    autostart: bool,
}

impl ChatSupervisor {
    pub fn spawn(token: Option<String>, table: HandlerTable, autostart: bool) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let owner = BotOwner {
            token,
            table: Arc::new(table),
            running: None,
        };
        tokio::spawn(owner.run(rx));
        Self { tx, autostart }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| anyhow::anyhow!("chat supervisor is not running"))?;
        Ok(reply_rx.await?)
    }

    pub async fn start(&self) -> Result<BotStatus> {
        self.request(Command::Start).await?
    }

    pub async fn stop(&self) -> Result<BotStatus> {
        self.request(Command::Stop).await
    }

    pub async fn status(&self) -> Result<BotStatus> {
        self.request(Command::Status).await
    }

    /// REST connection of the running client, `None` while stopped.
    pub async fn connection(&self) -> Result<Option<Arc<dyn ChatConnection>>> {
        self.request(Command::Connection).await
    }
}

#[async_trait]
impl LifecycleComponent for ChatSupervisor {
    async fn on_init(&mut self) -> Result<()> {
        info!("Chat supervisor initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        if !self.autostart {
            return Ok(());
        }
        if let Err(e) = self.start().await {
            warn!("Discord bot not started: {}", e);
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("Chat supervisor shutting down...");
        self.stop().await?;
        Ok(())
    }
}
