use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use super::collect::{CollectionStrategy, build_context, collect_messages};
use super::connection::{ChatConnection, ChatMessage, ChatUser};
use super::delivery::{
    ResponseMode, completion_message, deliver, failure_message, processing_message,
};
use super::events::{ChatEvent, ChatEventHandler, ChatReaction};
use crate::core::dispatcher::{ActionDispatcher, DispatchOutcome};
use crate::core::store::Store;
use crate::core::store::types::{
    ActionRecord, CHAT_CONFIG_TYPE, CatchType, ChatTriggerConfigRecord,
};

/// Result of matching an event against the stored trigger configs.
#[derive(Debug, Clone)]
pub enum TriggerMatch {
    Matched {
        config: ChatTriggerConfigRecord,
        action: ActionRecord,
    },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    FromBot,
    NoConfig,
    NoAction,
    /// The reacted message was deleted before it could be fetched.
    MessageGone,
}

/// What happened to a matched trigger, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Delivered { execution_id: i64 },
    Failed { execution_id: i64 },
    Rejected(String),
    Ignored(IgnoreReason),
}

/// Shared tail of every chat trigger: collect, dispatch, answer.
#[derive(Clone)]
pub struct ChatPipeline {
    store: Store,
    dispatcher: ActionDispatcher,
}

impl ChatPipeline {
    pub fn new(store: Store, dispatcher: ActionDispatcher) -> Self {
        Self { store, dispatcher }
    }

    async fn linked_action(&self, config: ChatTriggerConfigRecord) -> Result<TriggerMatch> {
        match self
            .store
            .get_action_by_config(CHAT_CONFIG_TYPE, config.id)
            .await?
        {
            Some(action) => Ok(TriggerMatch::Matched { config, action }),
            None => {
                info!(
                    "No enabled action linked to chat config {} ({})",
                    config.id, config.name
                );
                Ok(TriggerMatch::Ignored(IgnoreReason::NoAction))
            }
        }
    }

    pub async fn match_reaction(&self, reaction: &ChatReaction) -> Result<TriggerMatch> {
        if reaction.user.is_bot {
            return Ok(TriggerMatch::Ignored(IgnoreReason::FromBot));
        }
        match self
            .store
            .find_chat_config(CatchType::Reaction, &reaction.emoji)
            .await?
        {
            Some(config) => self.linked_action(config).await,
            None => {
                info!("No chat config for reaction {}", reaction.emoji);
                Ok(TriggerMatch::Ignored(IgnoreReason::NoConfig))
            }
        }
    }

    /// First `text` / `textWithMention` config the message satisfies.
    pub async fn match_message(&self, message: &ChatMessage, bot_id: Option<u64>) -> Result<TriggerMatch> {
        if message.author.is_bot || Some(message.author.id) == bot_id {
            return Ok(TriggerMatch::Ignored(IgnoreReason::FromBot));
        }
        let configs = self
            .store
            .list_chat_configs_by_catch_types(&[CatchType::Text, CatchType::TextWithMention])
            .await?;

        let mentioned = bot_id.is_some_and(|id| message.mentions_user(id));
        let hit = configs.into_iter().find(|c| {
            !c.catch_value.is_empty()
                && message.content.contains(&c.catch_value)
                && (c.catch_type == CatchType::Text || mentioned)
        });
        match hit {
            Some(config) => self.linked_action(config).await,
            None => Ok(TriggerMatch::Ignored(IgnoreReason::NoConfig)),
        }
    }

    pub async fn run(
        &self,
        conn: &dyn ChatConnection,
        trigger: &ChatMessage,
        requester: &ChatUser,
        config: &ChatTriggerConfigRecord,
        action: &ActionRecord,
    ) -> Result<ChatOutcome> {
        let placeholder = conn
            .send(trigger.channel_id, &processing_message(requester))
            .await?;

        let strategy = CollectionStrategy::parse(&config.message_type);
        let collected = collect_messages(conn, trigger, strategy).await?;
        let channel_name = conn.channel_name(trigger.channel_id).await?;
        let context = build_context(trigger, requester, &channel_name, config, &collected);

        info!(
            "Chat trigger {} ({} '{}') -> action {}; {} message(s) collected",
            config.id,
            config.catch_type.as_str(),
            config.catch_value,
            action.id,
            collected.messages.len()
        );

        match self.dispatcher.trigger(action.id, &context, &[]).await? {
            DispatchOutcome::Dispatched(done) if done.result.success => {
                let response = completion_message(requester, &done.result.output);
                deliver(
                    conn,
                    ResponseMode::parse(&config.response_format),
                    trigger.channel_id,
                    &placeholder,
                    requester,
                    &response,
                )
                .await?;
                Ok(ChatOutcome::Delivered {
                    execution_id: done.execution_id,
                })
            }
            DispatchOutcome::Dispatched(done) => {
                error!(
                    "Chat-triggered execution {} failed: {}",
                    done.execution_id, done.result.output
                );
                conn.edit(placeholder.channel_id, placeholder.id, &failure_message(requester))
                    .await?;
                Ok(ChatOutcome::Failed {
                    execution_id: done.execution_id,
                })
            }
            DispatchOutcome::Rejected(rejection) => {
                let text = rejection.message();
                conn.edit(
                    placeholder.channel_id,
                    placeholder.id,
                    &format!("{} {}", requester.mention(), text),
                )
                .await?;
                Ok(ChatOutcome::Rejected(text))
            }
        }
    }
}

pub struct ReactionTrigger {
    pipeline: ChatPipeline,
}

impl ReactionTrigger {
    pub fn new(pipeline: ChatPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn process(
        &self,
        conn: &dyn ChatConnection,
        reaction: &ChatReaction,
    ) -> Result<ChatOutcome> {
        if conn.bot_user_id() == Some(reaction.user.id) {
            return Ok(ChatOutcome::Ignored(IgnoreReason::FromBot));
        }
        let (config, action) = match self.pipeline.match_reaction(reaction).await? {
            TriggerMatch::Matched { config, action } => (config, action),
            TriggerMatch::Ignored(reason) => return Ok(ChatOutcome::Ignored(reason)),
        };
        let Some(message) = conn.fetch(reaction.channel_id, reaction.message_id).await? else {
            info!("Reacted message {} is gone", reaction.message_id);
            return Ok(ChatOutcome::Ignored(IgnoreReason::MessageGone));
        };
        self.pipeline
            .run(conn, &message, &reaction.user, &config, &action)
            .await
    }
}

#[async_trait]
impl ChatEventHandler for ReactionTrigger {
    async fn handle(&self, conn: Arc<dyn ChatConnection>, event: ChatEvent) -> Result<()> {
        if let ChatEvent::ReactionAdd(reaction) = event {
            let outcome = self.process(conn.as_ref(), &reaction).await?;
            info!("Reaction {} handled: {:?}", reaction.emoji, outcome);
        }
        Ok(())
    }
}

pub struct MessageTrigger {
    pipeline: ChatPipeline,
}

impl MessageTrigger {
    pub fn new(pipeline: ChatPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn process(
        &self,
        conn: &dyn ChatConnection,
        message: &ChatMessage,
    ) -> Result<ChatOutcome> {
        let (config, action) = match self
            .pipeline
            .match_message(message, conn.bot_user_id())
            .await?
        {
            TriggerMatch::Matched { config, action } => (config, action),
            TriggerMatch::Ignored(reason) => return Ok(ChatOutcome::Ignored(reason)),
        };
        self.pipeline
            .run(conn, message, &message.author, &config, &action)
            .await
    }
}

#[async_trait]
impl ChatEventHandler for MessageTrigger {
    async fn handle(&self, conn: Arc<dyn ChatConnection>, event: ChatEvent) -> Result<()> {
        if let ChatEvent::Message(message) = event {
            let outcome = self.process(conn.as_ref(), &message).await?;
            if !matches!(outcome, ChatOutcome::Ignored(_)) {
                info!("Message {} handled: {:?}", message.id, outcome);
            }
        }
        Ok(())
    }
}
