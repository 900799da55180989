use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::connection::{ChatConnection, ChatMessage, ChatUser, matches_query};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Channel { channel_id: u64, content: String },
    Reply { message_id: u64, content: String },
    Edit { message_id: u64, content: String },
    Delete { message_id: u64 },
    Direct { user_id: u64, content: String },
}

/// In-memory chat platform for handler tests.
pub struct FakeConnection {
    pub bot_id: u64,
    pub messages: Mutex<BTreeMap<u64, ChatMessage>>,
    pub sent: Mutex<Vec<Sent>>,
    pub fetches: AtomicUsize,
    next_id: AtomicU64,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self {
            bot_id: 999,
            messages: Mutex::new(BTreeMap::new()),
            sent: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            next_id: AtomicU64::new(1_000_000),
        }
    }

    pub fn insert(&self, msg: ChatMessage) {
        self.messages.lock().unwrap().insert(msg.id, msg);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 9, 12, minute, 0).unwrap()
}

pub fn user(id: u64, name: &str) -> ChatUser {
    ChatUser {
        id,
        name: name.to_string(),
        is_bot: false,
    }
}

pub fn message(id: u64, author: &str, content: &str, minute: u32, reply_to: Option<u64>) -> ChatMessage {
    ChatMessage {
        id,
        channel_id: 10,
        author: user(id * 100, author),
        content: content.to_string(),
        created_at: at(minute),
        reference_id: reply_to,
        thread_id: None,
        mentions: Vec::new(),
        jump_url: format!("https://discord.com/channels/1/10/{}", id),
    }
}

#[async_trait]
impl ChatConnection for FakeConnection {
    fn bot_user_id(&self) -> Option<u64> {
        Some(self.bot_id)
    }

    async fn send(&self, channel_id: u64, content: &str) -> Result<ChatMessage> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(Sent::Channel {
            channel_id,
            content: content.to_string(),
        });
        let mut msg = message(id, "relay-bot", content, 59, None);
        msg.channel_id = channel_id;
        msg.author.id = self.bot_id;
        msg.author.is_bot = true;
        Ok(msg)
    }

    async fn reply(
        &self,
        channel_id: u64,
        message_id: u64,
        content: &str,
    ) -> Result<ChatMessage> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(Sent::Reply {
            message_id,
            content: content.to_string(),
        });
        let mut msg = message(id, "relay-bot", content, 59, Some(message_id));
        msg.channel_id = channel_id;
        msg.author.id = self.bot_id;
        msg.author.is_bot = true;
        Ok(msg)
    }

    async fn edit(&self, _channel_id: u64, message_id: u64, content: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Edit {
            message_id,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, _channel_id: u64, message_id: u64) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Delete { message_id });
        Ok(())
    }

    async fn fetch(&self, _channel_id: u64, message_id: u64) -> Result<Option<ChatMessage>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.messages.lock().unwrap().get(&message_id).cloned())
    }

    async fn history(
        &self,
        channel_id: u64,
        before: Option<u64>,
        limit: u8,
    ) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .values()
            .rev()
            .filter(|m| m.channel_id == channel_id)
            .filter(|m| before.is_none_or(|b| m.id < b))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn search(&self, channel_id: u64, query: &str, limit: u8) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .values()
            .rev()
            .filter(|m| m.channel_id == channel_id && matches_query(m, query))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn send_direct(&self, user_id: u64, content: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Direct {
            user_id,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn channel_name(&self, _channel_id: u64) -> Result<String> {
        Ok("general".to_string())
    }
}
