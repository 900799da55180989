use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{actions, chat, health, mcp, tasks, webhooks};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    // External services authenticate through HMAC signatures
    let public_routes = Router::new()
        .route(
            "/api/webhooks/{action_id}",
            post(webhooks::webhook_endpoint),
        )
        .route("/api/health", get(health::health_endpoint))
        .route("/api/health/ping", get(health::ping_endpoint))
        .layer(middleware::from_fn(security_headers))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/api/actions", post(actions::create_action_endpoint))
        .route("/api/actions/{action_id}", get(actions::get_action_endpoint))
        .route(
            "/api/actions/{action_id}/trigger",
            post(actions::trigger_action_endpoint),
        )
        .route(
            "/api/actions/{action_id}/enable",
            post(actions::enable_action_endpoint),
        )
        .route(
            "/api/actions/{action_id}/disable",
            post(actions::disable_action_endpoint),
        )
        .route(
            "/api/tasks/templates",
            post(tasks::create_template_endpoint),
        )
        .route(
            "/api/tasks/templates/{template_id}",
            get(tasks::get_template_endpoint),
        )
        .route(
            "/api/tasks/executions",
            post(tasks::execute_template_endpoint),
        )
        .route(
            "/api/tasks/executions/{execution_id}",
            get(tasks::get_execution_endpoint),
        )
        .route("/api/tasks", post(tasks::create_task_endpoint))
        .route("/api/tasks/{task_id}", get(tasks::get_task_endpoint))
        .route("/api/chat/configs", post(chat::create_chat_config_endpoint))
        .route(
            "/api/chat/configs/{config_id}",
            get(chat::get_chat_config_endpoint).delete(chat::delete_chat_config_endpoint),
        )
        .route(
            "/api/chat/configs/{config_id}/link",
            post(chat::link_chat_config_endpoint),
        )
        .route("/api/chat/bot/start", post(chat::start_bot_endpoint))
        .route("/api/chat/bot/stop", post(chat::stop_bot_endpoint))
        .route("/api/chat/bot/status", get(chat::bot_status_endpoint))
        .route("/api/mcp/discord", post(mcp::discord_tools_endpoint))
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state.clone());

    public_routes.merge(api_routes)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}
