use anyhow::Result;
use tracing::debug;

use super::connection::{ChatConnection, ChatMessage, ChatUser};

/// Discord rejects messages longer than this.
pub const HARD_LIMIT: usize = 2000;
/// Slice size used once a response is over the limit.
pub const CHUNK_SIZE: usize = 1900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Reply,
    Dm,
    Channel,
}

impl ResponseMode {
    /// Unrecognised formats fall back to `Reply`.
    pub fn parse(value: &str) -> Self {
        match value {
            "dm" => Self::Dm,
            "channel" => Self::Channel,
            _ => Self::Reply,
        }
    }
}

pub fn completion_message(requester: &ChatUser, output: &str) -> String {
    format!("{} Processing complete.\n\n{}\n\n", requester.mention(), output)
}

pub fn processing_message(requester: &ChatUser) -> String {
    format!("{} Processing your request...", requester.mention())
}

pub fn failure_message(requester: &ChatUser) -> String {
    format!("{} An error occurred while processing.", requester.mention())
}

pub fn apology_message(mention: Option<&str>) -> String {
    match mention {
        Some(m) => format!("{} Sorry, something went wrong while processing your request.", m),
        None => "Sorry, something went wrong while processing your request.".to_string(),
    }
}

/// Cut `text` into slices of at most `size` characters.
pub fn split_message(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// The messages a response is sent as.
pub fn plan_chunks(response: &str) -> Vec<String> {
    if response.chars().count() > HARD_LIMIT {
        split_message(response, CHUNK_SIZE)
    } else {
        vec![response.to_string()]
    }
}

/// Send `response` according to `mode`, consuming the placeholder message.
pub async fn deliver(
    conn: &dyn ChatConnection,
    mode: ResponseMode,
    channel_id: u64,
    placeholder: &ChatMessage,
    requester: &ChatUser,
    response: &str,
) -> Result<()> {
    let chunks = plan_chunks(response);
    debug!("Delivering {} chunk(s) as {:?}", chunks.len(), mode);

    match mode {
        ResponseMode::Reply => {
            let mut iter = chunks.iter();
            if let Some(first) = iter.next() {
                conn.edit(placeholder.channel_id, placeholder.id, first)
                    .await?;
            }
            for chunk in iter {
                conn.send(channel_id, chunk).await?;
            }
        }
        ResponseMode::Dm => {
            for chunk in &chunks {
                conn.send_direct(requester.id, chunk).await?;
            }
            conn.edit(
                placeholder.channel_id,
                placeholder.id,
                &format!("{} The result has been sent to your DMs.", requester.mention()),
            )
            .await?;
        }
        ResponseMode::Channel => {
            for chunk in &chunks {
                conn.send(channel_id, chunk).await?;
            }
            conn.delete(placeholder.channel_id, placeholder.id).await?;
        }
    }
    Ok(())
}
