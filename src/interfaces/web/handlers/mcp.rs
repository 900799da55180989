use axum::{Json, extract::State};
use serde_json::Value;
use tracing::warn;

use super::super::AppState;
use crate::interfaces::discord::tools;

/// JSON-RPC entry point for the chat tools. Calls are served by whichever
/// client the supervisor is running at the time.
pub async fn discord_tools_endpoint(
    State(state): State<AppState>,
    Json(request): Json<Value>,
) -> Json<Value> {
    let conn = match state.supervisor.connection().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Chat supervisor unavailable: {}", e);
            None
        }
    };
    Json(tools::handle_rpc(conn.as_deref(), &request).await)
}
