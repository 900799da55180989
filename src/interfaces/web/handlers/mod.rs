pub mod actions;
pub mod chat;
pub mod health;
pub mod mcp;
pub mod tasks;
pub mod webhooks;

use axum::Json;
use serde_json::{Value, json};

pub(super) fn failure(error: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "success": false, "error": error.to_string() }))
}

pub(super) fn db_failure(error: anyhow::Error) -> Json<Value> {
    Json(json!({ "success": false, "error": format!("Database error: {}", error) }))
}
