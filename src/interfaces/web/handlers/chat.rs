use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use tracing::info;

use super::super::AppState;
use super::{db_failure, failure};
use crate::core::store::types::{CHAT_CONFIG_TYPE, CatchType};

#[derive(serde::Deserialize)]
pub struct CreateChatConfigRequest {
    name: String,
    #[serde(default = "default_catch_type")]
    catch_type: String,
    catch_value: String,
    #[serde(default = "default_message_type")]
    message_type: String,
    #[serde(default = "default_response_format")]
    response_format: String,
    /// Link to this action right away.
    #[serde(default)]
    action_id: Option<i64>,
}

fn default_catch_type() -> String {
    "reaction".to_string()
}
fn default_message_type() -> String {
    "single".to_string()
}
fn default_response_format() -> String {
    "reply".to_string()
}

pub async fn create_chat_config_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateChatConfigRequest>,
) -> Json<Value> {
    let name = payload.name.trim();
    if name.is_empty() || payload.catch_value.trim().is_empty() {
        return failure("name and catch_value are required");
    }
    let Some(catch_type) = CatchType::parse(payload.catch_type.trim()) else {
        return failure("catch_type must be one of reaction, text, textWithMention");
    };

    if let Some(action_id) = payload.action_id {
        match state.store.get_action(action_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return failure(format!("Action {} not found", action_id)),
            Err(e) => return db_failure(e),
        }
    }

    let config = match state
        .store
        .create_chat_config(
            name,
            catch_type,
            payload.catch_value.trim(),
            payload.message_type.trim(),
            payload.response_format.trim(),
        )
        .await
    {
        Ok(config) => config,
        Err(e) => return db_failure(e),
    };

    if let Some(action_id) = payload.action_id
        && let Err(e) = state
            .store
            .link_action_config(action_id, CHAT_CONFIG_TYPE, config.id)
            .await
    {
        return db_failure(e);
    }
    info!(
        "Chat config {} ({} '{}') created",
        config.id,
        config.catch_type.as_str(),
        config.catch_value
    );
    Json(json!({ "success": true, "config": config }))
}

pub async fn get_chat_config_endpoint(
    Path(config_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<Value> {
    let config = match state.store.get_chat_config(config_id).await {
        Ok(Some(config)) => config,
        Ok(None) => return failure(format!("Chat config {} not found", config_id)),
        Err(e) => return db_failure(e),
    };
    let action = match state
        .store
        .get_action_by_config(CHAT_CONFIG_TYPE, config_id)
        .await
    {
        Ok(action) => action,
        Err(e) => return db_failure(e),
    };
    Json(json!({ "success": true, "config": config, "action": action }))
}

pub async fn delete_chat_config_endpoint(
    Path(config_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<Value> {
    match state.store.delete_chat_config(config_id).await {
        Ok(true) => Json(json!({ "success": true, "message": "Chat config removed" })),
        Ok(false) => failure(format!("Chat config {} not found", config_id)),
        Err(e) => db_failure(e),
    }
}

#[derive(serde::Deserialize)]
pub struct LinkActionRequest {
    action_id: i64,
}

pub async fn link_chat_config_endpoint(
    Path(config_id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<LinkActionRequest>,
) -> Json<Value> {
    match state.store.get_chat_config(config_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return failure(format!("Chat config {} not found", config_id)),
        Err(e) => return db_failure(e),
    }
    match link(&state, payload.action_id, config_id).await {
        Ok(()) => Json(json!({
            "success": true,
            "config_id": config_id,
            "action_id": payload.action_id
        })),
        Err(e) => failure(e),
    }
}

async fn link(state: &AppState, action_id: i64, config_id: i64) -> anyhow::Result<()> {
    if state.store.get_action(action_id).await?.is_none() {
        anyhow::bail!("Action {} not found", action_id);
    }
    state
        .store
        .link_action_config(action_id, CHAT_CONFIG_TYPE, config_id)
        .await
}

// === Bot supervision ===

pub async fn start_bot_endpoint(State(state): State<AppState>) -> Json<Value> {
    match state.supervisor.start().await {
        Ok(status) => Json(json!({ "success": true, "status": status })),
        Err(e) => failure(e),
    }
}

pub async fn stop_bot_endpoint(State(state): State<AppState>) -> Json<Value> {
    match state.supervisor.stop().await {
        Ok(status) => Json(json!({ "success": true, "status": status })),
        Err(e) => failure(e),
    }
}

pub async fn bot_status_endpoint(State(state): State<AppState>) -> Json<Value> {
    match state.supervisor.status().await {
        Ok(status) => Json(json!({ "success": true, "status": status })),
        Err(e) => failure(e),
    }
}
