use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId, CreateMessage, EditMessage, GetMessages, Http, HttpError, Message, MessageId,
    UserId,
};
use std::sync::Arc;

/// Milliseconds between the Unix epoch and the first Discord snowflake.
const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// History pages scanned by `search`; bots have no server-side search.
const SEARCH_PAGES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatUser {
    pub id: u64,
    pub name: String,
    pub is_bot: bool,
}

impl ChatUser {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// Platform-neutral view of a chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: u64,
    pub channel_id: u64,
    pub author: ChatUser,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Id of the message this one replies to.
    pub reference_id: Option<u64>,
    /// Thread started from this message, if any.
    pub thread_id: Option<u64>,
    pub mentions: Vec<u64>,
    pub jump_url: String,
}

impl ChatMessage {
    pub fn mentions_user(&self, user_id: u64) -> bool {
        self.mentions.contains(&user_id)
    }
}

/// Creation time encoded in a Discord snowflake.
pub fn snowflake_time(id: u64) -> DateTime<Utc> {
    let millis = (id >> 22) + DISCORD_EPOCH_MS;
    DateTime::from_timestamp_millis(millis as i64).unwrap_or_default()
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.get(),
            channel_id: msg.channel_id.get(),
            author: ChatUser {
                id: msg.author.id.get(),
                name: msg.author.name.clone(),
                is_bot: msg.author.bot,
            },
            content: msg.content.clone(),
            created_at: snowflake_time(msg.id.get()),
            reference_id: msg
                .message_reference
                .as_ref()
                .and_then(|r| r.message_id)
                .map(|id| id.get()),
            thread_id: msg.thread.as_ref().map(|t| t.id.get()),
            mentions: msg.mentions.iter().map(|u| u.id.get()).collect(),
            jump_url: msg.link(),
        }
    }
}

/// Operations the chat handlers need from a live connection. Handed to every
/// event so handlers never reach for a global client.
#[async_trait]
pub trait ChatConnection: Send + Sync {
    /// The bot's own user id, once known.
    fn bot_user_id(&self) -> Option<u64>;

    async fn send(&self, channel_id: u64, content: &str) -> Result<ChatMessage>;

    /// Sends `content` as a reply to `message_id`.
    async fn reply(&self, channel_id: u64, message_id: u64, content: &str)
    -> Result<ChatMessage>;

    async fn edit(&self, channel_id: u64, message_id: u64, content: &str) -> Result<()>;

    async fn delete(&self, channel_id: u64, message_id: u64) -> Result<()>;

    /// `Ok(None)` when the message no longer exists.
    async fn fetch(&self, channel_id: u64, message_id: u64) -> Result<Option<ChatMessage>>;

    /// Up to `limit` messages older than `before` (or the newest ones),
    /// newest first.
    async fn history(
        &self,
        channel_id: u64,
        before: Option<u64>,
        limit: u8,
    ) -> Result<Vec<ChatMessage>>;

    /// Up to `limit` recent messages whose content contains `query`,
    /// ignoring case, newest first.
    async fn search(&self, channel_id: u64, query: &str, limit: u8) -> Result<Vec<ChatMessage>>;

    async fn send_direct(&self, user_id: u64, content: &str) -> Result<()>;

    async fn channel_name(&self, channel_id: u64) -> Result<String>;
}

/// Case-insensitive substring match used by every `search` implementation.
pub fn matches_query(msg: &ChatMessage, query: &str) -> bool {
    msg.content.to_lowercase().contains(&query.to_lowercase())
}

/// `ChatConnection` over serenity's REST client.
pub struct SerenityConnection {
    http: Arc<Http>,
    bot_user: Option<u64>,
}

impl SerenityConnection {
    pub fn new(http: Arc<Http>, bot_user: Option<u64>) -> Self {
        Self { http, bot_user }
    }
}

#[async_trait]
impl ChatConnection for SerenityConnection {
    fn bot_user_id(&self) -> Option<u64> {
        self.bot_user
    }

    async fn send(&self, channel_id: u64, content: &str) -> Result<ChatMessage> {
        let msg = ChannelId::new(channel_id).say(&self.http, content).await?;
        Ok(ChatMessage::from(&msg))
    }

    async fn reply(
        &self,
        channel_id: u64,
        message_id: u64,
        content: &str,
    ) -> Result<ChatMessage> {
        let channel = ChannelId::new(channel_id);
        let builder = CreateMessage::new()
            .content(content)
            .reference_message((channel, MessageId::new(message_id)));
        let msg = channel.send_message(&self.http, builder).await?;
        Ok(ChatMessage::from(&msg))
    }

    async fn edit(&self, channel_id: u64, message_id: u64, content: &str) -> Result<()> {
        ChannelId::new(channel_id)
            .edit_message(
                &self.http,
                MessageId::new(message_id),
                EditMessage::new().content(content),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, channel_id: u64, message_id: u64) -> Result<()> {
        ChannelId::new(channel_id)
            .delete_message(&self.http, MessageId::new(message_id))
            .await?;
        Ok(())
    }

    async fn fetch(&self, channel_id: u64, message_id: u64) -> Result<Option<ChatMessage>> {
        match ChannelId::new(channel_id)
            .message(&self.http, MessageId::new(message_id))
            .await
        {
            Ok(msg) => Ok(Some(ChatMessage::from(&msg))),
            Err(serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)))
                if resp.status_code.as_u16() == 404 =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn history(
        &self,
        channel_id: u64,
        before: Option<u64>,
        limit: u8,
    ) -> Result<Vec<ChatMessage>> {
        let mut builder = GetMessages::new().limit(limit);
        if let Some(before) = before {
            builder = builder.before(MessageId::new(before));
        }
        let messages = ChannelId::new(channel_id)
            .messages(&self.http, builder)
            .await?;
        Ok(messages.iter().map(ChatMessage::from).collect())
    }

    async fn search(&self, channel_id: u64, query: &str, limit: u8) -> Result<Vec<ChatMessage>> {
        let mut found = Vec::new();
        let mut before = None;
        for _ in 0..SEARCH_PAGES {
            let page = self.history(channel_id, before, 100).await?;
            let Some(oldest) = page.last() else {
                break;
            };
            before = Some(oldest.id);
            let exhausted = page.len() < 100;
            found.extend(page.into_iter().filter(|m| matches_query(m, query)));
            if found.len() >= limit as usize || exhausted {
                break;
            }
        }
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn send_direct(&self, user_id: u64, content: &str) -> Result<()> {
        let dm = UserId::new(user_id).create_dm_channel(&self.http).await?;
        dm.id.say(&self.http, content).await?;
        Ok(())
    }

    async fn channel_name(&self, channel_id: u64) -> Result<String> {
        let channel = ChannelId::new(channel_id).to_channel(&self.http).await?;
        Ok(match channel.guild() {
            Some(guild_channel) => guild_channel.name,
            None => "direct-message".to_string(),
        })
    }
}
