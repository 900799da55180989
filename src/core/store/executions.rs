use anyhow::{Result, bail};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;

use super::Store;
use super::types::{ExecutionRecord, ExecutionStatus, json_column, status_column};

const EXECUTION_COLUMNS: &str = "id, template_id, context, status, result, extensions_output, error, created_at, completed_at";

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        id: row.get(0)?,
        template_id: row.get(1)?,
        context: json_column(row.get(2)?),
        status: status_column(row.get(3)?)?,
        result: row.get(4)?,
        extensions_output: json_column(row.get(5)?),
        error: row.get(6)?,
        created_at: row.get(7)?,
        completed_at: row.get(8)?,
    })
}

/// Move a row of `table` into `next`, guarded on the required previous
/// status. A row that is missing or in any other state is left untouched.
pub(super) fn transition(
    db: &Connection,
    table: &str,
    id: i64,
    next: ExecutionStatus,
    result: Option<&str>,
    extensions_output: Option<&Value>,
    error: Option<&str>,
) -> Result<()> {
    let Some(previous) = next.required_previous() else {
        bail!("{} {} cannot move back to {}", table, id, next.as_str());
    };

    let rows_updated = if next.is_terminal() {
        let extensions = extensions_output.map(serde_json::to_string).transpose()?;
        db.execute(
            &format!(
                "UPDATE {table} SET status = ?1, result = ?2, extensions_output = ?3, error = ?4,
                 completed_at = CURRENT_TIMESTAMP WHERE id = ?5 AND status = ?6"
            ),
            params![
                next.as_str(),
                result,
                extensions,
                error,
                id,
                previous.as_str()
            ],
        )?
    } else {
        db.execute(
            &format!("UPDATE {table} SET status = ?1 WHERE id = ?2 AND status = ?3"),
            params![next.as_str(), id, previous.as_str()],
        )?
    };

    if rows_updated == 0 {
        bail!(
            "{} {} is not {}; refusing transition to {}",
            table,
            id,
            previous.as_str(),
            next.as_str()
        );
    }
    Ok(())
}

impl Store {
    /// Insert a new execution in `pending`.
    pub async fn create_execution(
        &self,
        template_id: i64,
        context: Option<&Value>,
    ) -> Result<ExecutionRecord> {
        let context = context.map(serde_json::to_string).transpose()?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO task_executions (template_id, context, status) VALUES (?1, ?2, ?3)",
            params![template_id, context, ExecutionStatus::Pending.as_str()],
        )?;
        let id = db.last_insert_rowid();
        let record = db.query_row(
            &format!("SELECT {EXECUTION_COLUMNS} FROM task_executions WHERE id = ?1"),
            params![id],
            execution_from_row,
        )?;
        Ok(record)
    }

    pub async fn get_execution(&self, id: i64) -> Result<Option<ExecutionRecord>> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                &format!("SELECT {EXECUTION_COLUMNS} FROM task_executions WHERE id = ?1"),
                params![id],
                execution_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub async fn mark_execution_processing(&self, id: i64) -> Result<()> {
        let db = self.db.lock().await;
        transition(
            &db,
            "task_executions",
            id,
            ExecutionStatus::Processing,
            None,
            None,
            None,
        )
    }

    /// Record the terminal outcome of an execution.
    pub async fn finish_execution(
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
        transition(
            &db,
            "task_executions",
            id,
            status,
            result,
            extensions_output,
            error,
        )
    }

    #[cfg(test)]
    pub async fn count_executions(&self) -> Result<i64> {
        let db = self.db.lock().await;
        let count = db.query_row("SELECT COUNT(*) FROM task_executions", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}
