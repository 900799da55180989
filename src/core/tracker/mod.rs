use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::core::executor::{ExecutionResult, TaskExecutor};
use crate::core::store::Store;
use crate::core::store::types::{ExecutionStatus, TemplateRecord};

/// A template execution that reached a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedExecution {
    pub execution_id: i64,
    pub template_id: i64,
    pub status: ExecutionStatus,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedTask {
    pub task_id: i64,
    pub status: ExecutionStatus,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

#[derive(Debug, Clone)]
pub enum TemplateRun {
    Finished(TrackedExecution),
    /// Nothing was recorded.
    TemplateNotFound(i64),
}

/// A standalone task request.
#[derive(Debug, Clone, Default)]
pub struct TaskSpec {
    pub name: Option<String>,
    pub task_type: String,
    pub prompt: String,
    pub context: Option<Value>,
    pub extensions: Vec<String>,
    pub session_name: Option<String>,
}

/// Persists executions and drives them through
/// `pending -> processing -> completed | failed`.
#[derive(Clone)]
pub struct Tracker {
    store: Store,
    executor: TaskExecutor,
}

impl Tracker {
    pub fn new(store: Store, executor: TaskExecutor) -> Self {
        Self { store, executor }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub async fn execute_template(
        &self,
        template_id: i64,
        context: Option<&Value>,
        extensions: &[String],
    ) -> Result<TemplateRun> {
        let Some(template) = self.store.get_template(template_id).await? else {
            info!("Template {} not found; nothing recorded", template_id);
            return Ok(TemplateRun::TemplateNotFound(template_id));
        };
        let tracked = self
            .execute_with_template(&template, context, extensions)
            .await?;
        Ok(TemplateRun::Finished(tracked))
    }

    pub async fn execute_with_template(
        &self,
        template: &TemplateRecord,
        context: Option<&Value>,
        extensions: &[String],
    ) -> Result<TrackedExecution> {
        let execution = self.store.create_execution(template.id, context).await?;
        info!(
            "Execution {} created for template {} ({})",
            execution.id, template.id, template.name
        );
        self.store.mark_execution_processing(execution.id).await?;

        let result = match self
            .executor
            .execute(&template.prompt, context, extensions, None)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Execution {} errored: {}", execution.id, e);
                let text = e.to_string();
                self.store
                    .finish_execution(execution.id, ExecutionStatus::Failed, None, None, Some(&text))
                    .await?;
                return Ok(TrackedExecution {
                    execution_id: execution.id,
                    template_id: template.id,
                    status: ExecutionStatus::Failed,
                    result: errored_result(text, context),
                });
            }
        };

        let status = if result.success {
            self.store
                .finish_execution(
                    execution.id,
                    ExecutionStatus::Completed,
                    Some(&result.output),
                    Some(&result.extensions_output),
                    None,
                )
                .await?;
            ExecutionStatus::Completed
        } else {
            self.store
                .finish_execution(
                    execution.id,
                    ExecutionStatus::Failed,
                    None,
                    None,
                    Some(&result.output),
                )
                .await?;
            ExecutionStatus::Failed
        };
        info!("Execution {} -> {}", execution.id, status.as_str());

        Ok(TrackedExecution {
            execution_id: execution.id,
            template_id: template.id,
            status,
            result,
        })
    }

    /// Run a standalone task. The record starts in `processing`.
    pub async fn run_task(&self, spec: &TaskSpec) -> Result<TrackedTask> {
        let task = self
            .store
            .create_task(
                spec.name.as_deref(),
                &spec.task_type,
                &spec.prompt,
                spec.context.as_ref(),
            )
            .await?;
        info!("Task {} ({}) dispatched", task.id, spec.task_type);

        let result = match self
            .executor
            .execute(
                &spec.prompt,
                spec.context.as_ref(),
                &spec.extensions,
                spec.session_name.as_deref(),
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Task {} errored: {}", task.id, e);
                let text = e.to_string();
                self.store
                    .finish_task(task.id, ExecutionStatus::Failed, None, None, Some(&text))
                    .await?;
                return Ok(TrackedTask {
                    task_id: task.id,
                    status: ExecutionStatus::Failed,
                    result: errored_result(text, spec.context.as_ref()),
                });
            }
        };

        let status = if result.success {
            self.store
                .finish_task(
                    task.id,
                    ExecutionStatus::Completed,
                    Some(&result.output),
                    Some(&result.extensions_output),
                    None,
                )
                .await?;
            ExecutionStatus::Completed
        } else {
            self.store
                .finish_task(task.id, ExecutionStatus::Failed, None, None, Some(&result.output))
                .await?;
            ExecutionStatus::Failed
        };

        Ok(TrackedTask {
            task_id: task.id,
            status,
            result,
        })
    }
}

fn errored_result(text: String, context: Option<&Value>) -> ExecutionResult {
    ExecutionResult {
        id: uuid::Uuid::new_v4().to_string(),
        success: false,
        output: text,
        extensions_output: Value::Object(Map::new()),
        context: context.cloned(),
        timestamp: Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::testing::StubRunner;
    use crate::core::store::test_store;
    use serde_json::json;

    fn tracker_with(runner: std::sync::Arc<StubRunner>) -> Tracker {
        Tracker::new(test_store(), TaskExecutor::new(runner))
    }

    #[tokio::test]
    async fn successful_template_run_completes_record() {
        let tracker = tracker_with(StubRunner::ok("Done.\nEXTENSION_OUTPUT: {\"k\":1}"));
        let tpl = tracker
            .store()
            .create_template("t", "general", "Summarize", None)
            .await
            .unwrap();

        let TemplateRun::Finished(run) = tracker
            .execute_template(tpl.id, Some(&json!({"a": 1})), &[])
            .await
            .unwrap()
        else {
            panic!("template should exist");
        };
        assert_eq!(run.status, ExecutionStatus::Completed);

        let record = tracker
            .store()
            .get_execution(run.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.result.as_deref(), Some("Done."));
        assert_eq!(record.extensions_output, Some(json!({"k": 1})));
        assert_eq!(record.context, Some(json!({"a": 1})));
        assert!(record.error.is_none());
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn failed_invocation_records_error_not_result() {
        let tracker = tracker_with(StubRunner::failing("boom"));
        let tpl = tracker
            .store()
            .create_template("t", "general", "p", None)
            .await
            .unwrap();
        let run = tracker.execute_with_template(&tpl, None, &[]).await.unwrap();
        assert_eq!(run.status, ExecutionStatus::Failed);

        let record = tracker
            .store()
            .get_execution(run.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert!(record.result.is_none());
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn missing_template_records_nothing() {
        let runner = StubRunner::ok("x");
        let tracker = tracker_with(runner.clone());
        let outcome = tracker.execute_template(42, None, &[]).await.unwrap();
        assert!(matches!(outcome, TemplateRun::TemplateNotFound(42)));
        assert_eq!(tracker.store().count_executions().await.unwrap(), 0);
        assert_eq!(runner.calls().await, 0);
    }

    #[tokio::test]
    async fn standalone_task_completes() {
        let tracker = tracker_with(StubRunner::ok("answer"));
        let run = tracker
            .run_task(&TaskSpec {
                name: Some("adhoc".into()),
                task_type: "api_request".into(),
                prompt: "question".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(run.status, ExecutionStatus::Completed);
        let task = tracker.store().get_task(run.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, ExecutionStatus::Completed);
        assert_eq!(task.result.as_deref(), Some("answer"));
    }
}
