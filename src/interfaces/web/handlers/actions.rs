use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use tracing::info;

use super::super::AppState;
use super::{db_failure, failure};
use crate::core::dispatcher::extraction::ExtractionRules;
use crate::core::store::types::TriggerType;

#[derive(serde::Deserialize)]
pub struct CreateActionRequest {
    name: String,
    trigger_type: String,
    #[serde(default)]
    template_id: Option<i64>,
    #[serde(default)]
    context_rules: Option<Value>,
}

pub async fn create_action_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateActionRequest>,
) -> Json<Value> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return failure("name is required");
    }
    let Some(trigger_type) = TriggerType::parse(payload.trigger_type.trim()) else {
        return failure("trigger_type must be one of api, chat, webhook");
    };
    if let Some(rules) = &payload.context_rules
        && let Err(e) = ExtractionRules::from_value(rules)
    {
        return failure(format!("Invalid context_rules: {}", e));
    }
    if let Some(template_id) = payload.template_id {
        match state.store.get_template(template_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return failure(format!("Template {} not found", template_id)),
            Err(e) => return db_failure(e),
        }
    }

    match state
        .store
        .create_action(
            &name,
            trigger_type,
            payload.template_id,
            payload.context_rules.as_ref(),
        )
        .await
    {
        Ok(action) => {
            info!("Action {} ({}) created", action.id, action.name);
            Json(json!({ "success": true, "action": action }))
        }
        Err(e) => db_failure(e),
    }
}

pub async fn get_action_endpoint(
    Path(action_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<Value> {
    match state.store.get_action(action_id).await {
        Ok(Some(action)) => Json(json!({ "success": true, "action": action })),
        Ok(None) => failure(format!("Action {} not found", action_id)),
        Err(e) => db_failure(e),
    }
}

/// The request body is the trigger payload itself.
pub async fn trigger_action_endpoint(
    Path(action_id): Path<i64>,
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Json<Value> {
    let payload = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    match state.dispatcher.trigger(action_id, &payload, &[]).await {
        Ok(outcome) => Json(outcome.to_json()),
        Err(e) => failure(e),
    }
}

pub async fn enable_action_endpoint(
    Path(action_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<Value> {
    set_enabled(state, action_id, true).await
}

pub async fn disable_action_endpoint(
    Path(action_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<Value> {
    set_enabled(state, action_id, false).await
}

async fn set_enabled(state: AppState, action_id: i64, enabled: bool) -> Json<Value> {
    match state.store.set_action_enabled(action_id, enabled).await {
        Ok(true) => {
            info!(
                "Action {} {}",
                action_id,
                if enabled { "enabled" } else { "disabled" }
            );
            Json(json!({ "success": true, "action_id": action_id, "enabled": enabled }))
        }
        Ok(false) => failure(format!("Action {} not found", action_id)),
        Err(e) => db_failure(e),
    }
}
