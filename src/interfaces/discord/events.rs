use anyhow::Result;
use async_trait::async_trait;
use serenity::all::{Context, EventHandler, Message, Reaction, Ready};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

use super::connection::{ChatConnection, ChatMessage, ChatUser, SerenityConnection};
use super::delivery::apology_message;

#[derive(Debug, Clone)]
pub struct ChatReaction {
    pub channel_id: u64,
    pub message_id: u64,
    pub user: ChatUser,
    /// Unicode emoji, or `<:name:id>` for custom ones.
    pub emoji: String,
}

#[derive(Debug, Clone)]
pub enum ChatEvent {
    ReactionAdd(ChatReaction),
    Message(ChatMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatEventKind {
    ReactionAdd,
    Message,
}

impl ChatEvent {
    pub fn kind(&self) -> ChatEventKind {
        match self {
            Self::ReactionAdd(_) => ChatEventKind::ReactionAdd,
            Self::Message(_) => ChatEventKind::Message,
        }
    }

    pub fn channel_id(&self) -> u64 {
        match self {
            Self::ReactionAdd(r) => r.channel_id,
            Self::Message(m) => m.channel_id,
        }
    }

    pub fn actor(&self) -> &ChatUser {
        match self {
            Self::ReactionAdd(r) => &r.user,
            Self::Message(m) => &m.author,
        }
    }
}

#[async_trait]
pub trait ChatEventHandler: Send + Sync {
    async fn handle(&self, conn: Arc<dyn ChatConnection>, event: ChatEvent) -> Result<()>;
}

/// Handlers keyed by event kind. Every handler runs in its own task so an
/// error or a panic is contained, logged and answered with an apology.
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<ChatEventKind, Vec<Arc<dyn ChatEventHandler>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ChatEventKind, handler: Arc<dyn ChatEventHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    #[cfg(test)]
    pub fn handler_count(&self, kind: ChatEventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    pub async fn dispatch(&self, conn: Arc<dyn ChatConnection>, event: ChatEvent) {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            return;
        };

        for handler in handlers {
            let task = tokio::spawn({
                let handler = handler.clone();
                let conn = conn.clone();
                let event = event.clone();
                async move { handler.handle(conn, event).await }
            });

            let failure = match task.await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(join_err) if join_err.is_panic() => "handler panicked".to_string(),
                Err(join_err) => join_err.to_string(),
            };

            error!("{:?} handler failed: {}", event.kind(), failure);
            let mention = event.actor().mention();
            if let Err(e) = conn
                .send(event.channel_id(), &apology_message(Some(&mention)))
                .await
            {
                warn!("Could not post apology: {}", e);
            }
        }
    }
}

/// serenity's event sink. Translates gateway events and hands them to the
/// handler table with a connection built from the event's context.
pub struct GatewayHandler {
    table: Arc<HandlerTable>,
    bot_user: OnceLock<u64>,
}

impl GatewayHandler {
    pub fn new(table: Arc<HandlerTable>) -> Self {
        Self {
            table,
            bot_user: OnceLock::new(),
        }
    }

    fn connection(&self, ctx: &Context) -> Arc<dyn ChatConnection> {
        Arc::new(SerenityConnection::new(
            ctx.http.clone(),
            self.bot_user.get().copied(),
        ))
    }
}

#[async_trait]
impl EventHandler for GatewayHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        let event = ChatEvent::Message(ChatMessage::from(&msg));
        self.table.dispatch(self.connection(&ctx), event).await;
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let user = match reaction.user(&ctx.http).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Could not resolve reacting user: {}", e);
                return;
            }
        };
        let event = ChatEvent::ReactionAdd(ChatReaction {
            channel_id: reaction.channel_id.get(),
            message_id: reaction.message_id.get(),
            user: ChatUser {
                id: user.id.get(),
                name: user.name.clone(),
                is_bot: user.bot,
            },
            emoji: reaction.emoji.to_string(),
        });
        self.table.dispatch(self.connection(&ctx), event).await;
    }

    async fn ready(&self, _: Context, ready: Ready) {
        let _ = self.bot_user.set(ready.user.id.get());
        info!("Discord bot connected as {}", ready.user.name);
    }
}
