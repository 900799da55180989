use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::{Value, json};

use super::super::AppState;

pub async fn health_endpoint(State(state): State<AppState>) -> Json<Value> {
    let database = match state.store.ping().await {
        Ok(()) => json!({ "status": "ok", "error": null }),
        Err(e) => json!({ "status": "error", "error": e.to_string() }),
    };
    let agent = match state.tracker.executor().runner().version().await {
        Ok(version) => json!({ "status": "ok", "version": version }),
        Err(e) => json!({ "status": "error", "error": e.to_string() }),
    };
    let chat_bot = match state.supervisor.status().await {
        Ok(status) => json!(status),
        Err(e) => json!({ "error": e.to_string() }),
    };

    Json(json!({
        "success": true,
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "app_name": env!("CARGO_PKG_NAME"),
        "app_version": env!("CARGO_PKG_VERSION"),
        "system_info": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "database": database,
        "agent": agent,
        "chat_bot": chat_bot,
    }))
}

pub async fn ping_endpoint() -> Json<Value> {
    Json(json!({ "ping": "pong" }))
}
