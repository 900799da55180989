//! Chat tools for agents, served as JSON-RPC 2.0 (`initialize`,
//! `tools/list`, `tools/call`). Every call goes through the connection of
//! the bot the supervisor is running.

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::connection::{ChatConnection, ChatMessage};

pub const SERVER_NAME: &str = "taskrelay-discord";
const PROTOCOL_VERSION: &str = "2024-11-05";

const DEFAULT_HISTORY_LIMIT: u8 = 10;
const DEFAULT_SEARCH_LIMIT: u8 = 25;
const MAX_LIMIT: u8 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
}

impl ToolResult {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "content": [{ "type": "text", "text": self.text }],
            "isError": self.is_error,
        })
    }
}

fn id_schema(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn limit_schema(default: u8) -> Value {
    json!({ "type": "integer", "minimum": 1, "maximum": MAX_LIMIT, "default": default })
}

pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "discord_send_message",
            "description": "Send a message to a channel, optionally as a reply",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": id_schema("Target channel"),
                    "content": { "type": "string" },
                    "reference_message_id": id_schema("Message to reply to"),
                },
                "required": ["channel_id", "content"],
            }
        }),
        json!({
            "name": "discord_edit_message",
            "description": "Replace the content of a message the bot sent",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": id_schema("Channel holding the message"),
                    "message_id": id_schema("Message to edit"),
                    "content": { "type": "string" },
                },
                "required": ["channel_id", "message_id", "content"],
            }
        }),
        json!({
            "name": "discord_delete_message",
            "description": "Delete a message",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": id_schema("Channel holding the message"),
                    "message_id": id_schema("Message to delete"),
                },
                "required": ["channel_id", "message_id"],
            }
        }),
        json!({
            "name": "discord_get_message",
            "description": "Fetch a single message",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": id_schema("Channel holding the message"),
                    "message_id": id_schema("Message to fetch"),
                },
                "required": ["channel_id", "message_id"],
            }
        }),
        json!({
            "name": "discord_get_message_history",
            "description": "Recent messages in a channel, newest first",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": id_schema("Channel to read"),
                    "reference_message_id": id_schema("Only messages older than this one"),
                    "limit": limit_schema(DEFAULT_HISTORY_LIMIT),
                },
                "required": ["channel_id"],
            }
        }),
        json!({
            "name": "discord_search_messages",
            "description": "Recent messages whose content contains the query",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "channel_id": id_schema("Channel to search"),
                    "query": { "type": "string" },
                    "limit": limit_schema(DEFAULT_SEARCH_LIMIT),
                },
                "required": ["channel_id", "query"],
            }
        }),
    ]
}

/// Snowflakes arrive as strings or numbers depending on the client.
fn id_arg(args: &Value, key: &str) -> Result<Option<u64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a positive integer", key)),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a numeric id", key)),
        Some(_) => Err(anyhow!("{} must be a numeric id", key)),
    }
}

fn required_id(args: &Value, key: &str) -> Result<u64> {
    id_arg(args, key)?.ok_or_else(|| anyhow!("{} is required", key))
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("{} is required", key))
}

fn limit_arg(args: &Value, default: u8) -> u8 {
    args.get("limit")
        .and_then(Value::as_u64)
        .map_or(default, |n| n.clamp(1, MAX_LIMIT as u64) as u8)
}

fn describe(msg: &ChatMessage) -> String {
    format!(
        "ID: {}\nAuthor: {}\nContent: {}\nTimestamp: {}",
        msg.id,
        msg.author.name,
        msg.content,
        msg.created_at.to_rfc3339()
    )
}

fn describe_all(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(describe)
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Runs one tool. Argument and platform errors come back as error results.
pub async fn call_tool(conn: &dyn ChatConnection, name: &str, args: &Value) -> ToolResult {
    debug!("Chat tool call: {} {}", name, args);
    match run_tool(conn, name, args).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Chat tool {} failed: {}", name, e);
            ToolResult::error(format!("{} failed: {}", name, e))
        }
    }
}

async fn run_tool(conn: &dyn ChatConnection, name: &str, args: &Value) -> Result<ToolResult> {
    Ok(match name {
        "discord_send_message" => {
            let channel_id = required_id(args, "channel_id")?;
            let content = required_str(args, "content")?;
            let sent = match id_arg(args, "reference_message_id")? {
                Some(reply_to) => conn.reply(channel_id, reply_to, content).await?,
                None => conn.send(channel_id, content).await?,
            };
            ToolResult::ok(format!("Message sent: {}", sent.id))
        }
        "discord_edit_message" => {
            let message_id = required_id(args, "message_id")?;
            conn.edit(
                required_id(args, "channel_id")?,
                message_id,
                required_str(args, "content")?,
            )
            .await?;
            ToolResult::ok(format!("Message edited: {}", message_id))
        }
        "discord_delete_message" => {
            let message_id = required_id(args, "message_id")?;
            conn.delete(required_id(args, "channel_id")?, message_id)
                .await?;
            ToolResult::ok(format!("Message deleted: {}", message_id))
        }
        "discord_get_message" => {
            let message_id = required_id(args, "message_id")?;
            match conn
                .fetch(required_id(args, "channel_id")?, message_id)
                .await?
            {
                Some(msg) => ToolResult::ok(describe(&msg)),
                None => ToolResult::error(format!("Message {} not found", message_id)),
            }
        }
        "discord_get_message_history" => {
            let messages = conn
                .history(
                    required_id(args, "channel_id")?,
                    id_arg(args, "reference_message_id")?,
                    limit_arg(args, DEFAULT_HISTORY_LIMIT),
                )
                .await?;
            ToolResult::ok(format!(
                "{} messages:\n\n{}",
                messages.len(),
                describe_all(&messages)
            ))
        }
        "discord_search_messages" => {
            let query = required_str(args, "query")?;
            let messages = conn
                .search(
                    required_id(args, "channel_id")?,
                    query,
                    limit_arg(args, DEFAULT_SEARCH_LIMIT),
                )
                .await?;
            ToolResult::ok(format!(
                "{} messages matching \"{}\":\n\n{}",
                messages.len(),
                query,
                describe_all(&messages)
            ))
        }
        other => ToolResult::error(format!("Tool not found: {}", other)),
    })
}

fn rpc_result(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn rpc_error(id: Value, code: i64, message: String) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

/// Answers one JSON-RPC request. `conn` is `None` while the bot is stopped;
/// tool calls then fail but discovery still works.
pub async fn handle_rpc(conn: Option<&dyn ChatConnection>, request: &Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return rpc_error(id, -32600, "Invalid request: missing method".to_string());
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    match method {
        "initialize" => rpc_result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            }),
        ),
        "notifications/initialized" | "ping" => rpc_result(id, json!({})),
        "tools/list" => rpc_result(id, json!({ "tools": tool_definitions() })),
        "tools/call" => {
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return rpc_error(id, -32602, "Missing 'name' field".to_string());
            };
            let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            let result = match conn {
                Some(conn) => call_tool(conn, name, &args).await,
                None => ToolResult::error("Discord bot is not running"),
            };
            rpc_result(id, result.to_value())
        }
        other => {
            warn!("Unknown chat tool method: {}", other);
            rpc_error(id, -32601, format!("Method not found: {}", other))
        }
    }
}
