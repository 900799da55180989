use anyhow::Result;
use serde_json::{Value, json};

use super::connection::{ChatConnection, ChatMessage, ChatUser};
use super::conversation::{self, GraphLimits};
use crate::core::store::types::ChatTriggerConfigRecord;

pub const THREAD_HISTORY_LIMIT: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStrategy {
    Single,
    Thread,
    Range,
    Conversation,
}

impl CollectionStrategy {
    pub fn parse(value: &str) -> Self {
        match value {
            "thread" => Self::Thread,
            "range" => Self::Range,
            "conversation" => Self::Conversation,
            _ => Self::Single,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Collected {
    pub messages: Vec<ChatMessage>,
    /// Rendered reply tree, for the conversation strategy only.
    pub conversation: Option<String>,
}

impl Collected {
    fn single(message: &ChatMessage) -> Self {
        Self {
            messages: vec![message.clone()],
            conversation: None,
        }
    }
}

pub async fn collect_messages(
    conn: &dyn ChatConnection,
    message: &ChatMessage,
    strategy: CollectionStrategy,
) -> Result<Collected> {
    match strategy {
        CollectionStrategy::Single | CollectionStrategy::Range => Ok(Collected::single(message)),
        CollectionStrategy::Thread => {
            let Some(thread_id) = message.thread_id else {
                return Ok(Collected::single(message));
            };
            let mut messages = conn
                .history(thread_id, None, THREAD_HISTORY_LIMIT)
                .await?;
            messages.reverse();
            Ok(Collected {
                messages,
                conversation: None,
            })
        }
        CollectionStrategy::Conversation => {
            let messages = conversation::reconstruct(conn, message, GraphLimits::default()).await?;
            let rendered = conversation::render_tree(&messages);
            Ok(Collected {
                messages,
                conversation: Some(rendered),
            })
        }
    }
}

pub fn message_to_json(message: &ChatMessage) -> Value {
    json!({
        "id": message.id.to_string(),
        "author": message.author.name,
        "content": message.content,
        "timestamp": message.created_at.to_rfc3339(),
        "reference_id": message.reference_id.map(|id| id.to_string()),
    })
}

/// Context handed to the agent for a chat-triggered action.
pub fn build_context(
    trigger: &ChatMessage,
    requester: &ChatUser,
    channel_name: &str,
    config: &ChatTriggerConfigRecord,
    collected: &Collected,
) -> Value {
    let mut context = json!({
        "messages": collected.messages.iter().map(message_to_json).collect::<Vec<_>>(),
        "channel_name": channel_name,
        "timestamp": trigger.created_at.to_rfc3339(),
        "requested_by": requester.name,
        "source_url": trigger.jump_url,
        "catch_type": config.catch_type.as_str(),
        "catch_value": config.catch_value,
    });
    if let (Some(rendered), Some(map)) = (&collected.conversation, context.as_object_mut()) {
        map.insert("conversation".to_string(), Value::String(rendered.clone()));
    }
    context
}
