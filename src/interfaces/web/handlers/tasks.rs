use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use super::super::AppState;
use super::{db_failure, failure};
use crate::core::tracker::{TaskSpec, TemplateRun};

#[derive(serde::Deserialize)]
pub struct CreateTemplateRequest {
    name: String,
    #[serde(default = "default_task_type")]
    task_type: String,
    prompt: String,
    #[serde(default)]
    description: Option<String>,
}

fn default_task_type() -> String {
    "general".to_string()
}

pub async fn create_template_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateTemplateRequest>,
) -> Json<Value> {
    let name = payload.name.trim();
    if name.is_empty() || payload.prompt.trim().is_empty() {
        return failure("name and prompt are required");
    }
    match state
        .store
        .create_template(
            name,
            payload.task_type.trim(),
            &payload.prompt,
            payload.description.as_deref(),
        )
        .await
    {
        Ok(template) => Json(json!({ "success": true, "template": template })),
        Err(e) => db_failure(e),
    }
}

pub async fn get_template_endpoint(
    Path(template_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<Value> {
    match state.store.get_template(template_id).await {
        Ok(Some(template)) => Json(json!({ "success": true, "template": template })),
        Ok(None) => failure(format!("Template {} not found", template_id)),
        Err(e) => db_failure(e),
    }
}

#[derive(serde::Deserialize)]
pub struct ExecuteTemplateRequest {
    template_id: i64,
    #[serde(default)]
    context: Option<Value>,
    #[serde(default)]
    extensions: Vec<String>,
}

pub async fn execute_template_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<ExecuteTemplateRequest>,
) -> Json<Value> {
    match state
        .tracker
        .execute_template(
            payload.template_id,
            payload.context.as_ref(),
            &payload.extensions,
        )
        .await
    {
        Ok(TemplateRun::Finished(run)) => Json(serde_json::to_value(&run).unwrap_or_else(
            |e| json!({ "success": false, "error": e.to_string() }),
        )),
        Ok(TemplateRun::TemplateNotFound(id)) => failure(format!("Template {} not found", id)),
        Err(e) => failure(e),
    }
}

pub async fn get_execution_endpoint(
    Path(execution_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<Value> {
    match state.store.get_execution(execution_id).await {
        Ok(Some(execution)) => Json(json!({ "success": true, "execution": execution })),
        Ok(None) => failure(format!("Execution {} not found", execution_id)),
        Err(e) => db_failure(e),
    }
}

#[derive(serde::Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_api_task_type")]
    task_type: String,
    prompt: String,
    #[serde(default)]
    context: Option<Value>,
    #[serde(default)]
    extensions: Vec<String>,
    #[serde(default)]
    session_name: Option<String>,
}

fn default_api_task_type() -> String {
    "api_request".to_string()
}

pub async fn create_task_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Json<Value> {
    if payload.prompt.trim().is_empty() {
        return failure("prompt is required");
    }
    let spec = TaskSpec {
        name: payload.name,
        task_type: payload.task_type,
        prompt: payload.prompt,
        context: payload.context,
        extensions: payload.extensions,
        session_name: payload.session_name,
    };
    match state.tracker.run_task(&spec).await {
        Ok(run) => Json(
            serde_json::to_value(&run)
                .unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() })),
        ),
        Err(e) => failure(e),
    }
}

pub async fn get_task_endpoint(
    Path(task_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<Value> {
    match state.store.get_task(task_id).await {
        Ok(Some(task)) => Json(json!({ "success": true, "task": task })),
        Ok(None) => failure(format!("Task {} not found", task_id)),
        Err(e) => db_failure(e),
    }
}
