use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `config_type` used when an Action is bound to a chat trigger config.
pub const CHAT_CONFIG_TYPE: &str = "discord";

/// Status shared by template executions and standalone tasks.
///
/// Transitions only move forward: `pending -> processing -> {completed, failed}`.
/// A terminal record is never written again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The state a record must be in to move into `self`.
    pub fn required_previous(&self) -> Option<Self> {
        match self {
            Self::Pending => None,
            Self::Processing => Some(Self::Pending),
            Self::Completed | Self::Failed => Some(Self::Processing),
        }
    }

    #[cfg(test)]
    pub fn can_transition_to(&self, next: Self) -> bool {
        next.required_previous() == Some(*self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Api,
    Chat,
    Webhook,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Chat => "chat",
            Self::Webhook => "webhook",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "api" => Some(Self::Api),
            "chat" | "discord" => Some(Self::Chat),
            "webhook" => Some(Self::Webhook),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatchType {
    #[serde(rename = "reaction")]
    Reaction,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "textWithMention")]
    TextWithMention,
}

impl CatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reaction => "reaction",
            Self::Text => "text",
            Self::TextWithMention => "textWithMention",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reaction" => Some(Self::Reaction),
            "text" => Some(Self::Text),
            "textWithMention" => Some(Self::TextWithMention),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateRecord {
    pub id: i64,
    pub name: String,
    pub task_type: String,
    pub prompt: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub template_id: i64,
    pub context: Option<Value>,
    pub status: ExecutionStatus,
    pub result: Option<String>,
    pub extensions_output: Option<Value>,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: i64,
    pub name: Option<String>,
    pub task_type: String,
    pub prompt: String,
    pub context: Option<Value>,
    pub status: ExecutionStatus,
    pub result: Option<String>,
    pub extensions_output: Option<Value>,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub id: i64,
    pub name: String,
    pub trigger_type: TriggerType,
    pub template_id: Option<i64>,
    pub context_rules: Option<Value>,
    pub enabled: bool,
    pub created_at: String,
    pub last_triggered_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTriggerConfigRecord {
    pub id: i64,
    pub name: String,
    pub catch_type: CatchType,
    pub catch_value: String,
    pub message_type: String,
    pub response_format: String,
    pub created_at: String,
}

/// Parse an optional JSON text column. Unparseable text is surfaced as a
/// JSON string so the row still loads.
pub(super) fn json_column(raw: Option<String>) -> Option<Value> {
    raw.map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

pub(super) fn status_column(raw: String) -> rusqlite::Result<ExecutionStatus> {
    ExecutionStatus::from_status(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown status '{}'", raw).into(),
        )
    })
}
