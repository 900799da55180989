use anyhow::{Result, bail};
use rusqlite::{OptionalExtension, Row, params};
use serde_json::Value;

use super::Store;
use super::executions::transition;
use super::types::{ExecutionStatus, TaskRecord, json_column, status_column};

const TASK_COLUMNS: &str = "id, name, task_type, prompt, context, status, result, extensions_output, error, created_at, completed_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        task_type: row.get(2)?,
        prompt: row.get(3)?,
        context: json_column(row.get(4)?),
        status: status_column(row.get(5)?)?,
        result: row.get(6)?,
        extensions_output: json_column(row.get(7)?),
        error: row.get(8)?,
        created_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

impl Store {
    /// Insert a standalone task. Standalone tasks are dispatched immediately,
    /// so they start in `processing`.
    pub async fn create_task(
        &self,
        name: Option<&str>,
        task_type: &str,
        prompt: &str,
        context: Option<&Value>,
    ) -> Result<TaskRecord> {
        let context = context.map(serde_json::to_string).transpose()?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO tasks (name, task_type, prompt, context, status) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                task_type,
                prompt,
                context,
                ExecutionStatus::Processing.as_str()
            ],
        )?;
        let id = db.last_insert_rowid();
        let record = db.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            task_from_row,
        )?;
        Ok(record)
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<TaskRecord>> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                task_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub async fn finish_task(
        &self,
        id: i64,
        status: ExecutionStatus,
        result: Option<&str>,
        extensions_output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<()> {
        if !status.is_terminal() {
            bail!("{} is not a terminal status", status.as_str());
        }
        let db = self.db.lock().await;
        transition(&db, "tasks", id, status, result, extensions_output, error)
    }
}
