use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use super::Store;
use super::types::TemplateRecord;

const TEMPLATE_COLUMNS: &str = "id, name, task_type, prompt, description, created_at";

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<TemplateRecord> {
    Ok(TemplateRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        task_type: row.get(2)?,
        prompt: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Store {
    pub async fn create_template(
        &self,
        name: &str,
        task_type: &str,
        prompt: &str,
        description: Option<&str>,
    ) -> Result<TemplateRecord> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO task_templates (name, task_type, prompt, description) VALUES (?1, ?2, ?3, ?4)",
            params![name, task_type, prompt, description],
        )?;
        let id = db.last_insert_rowid();
        let record = db.query_row(
            &format!("SELECT {TEMPLATE_COLUMNS} FROM task_templates WHERE id = ?1"),
            params![id],
            template_from_row,
        )?;
        Ok(record)
    }

    pub async fn get_template(&self, id: i64) -> Result<Option<TemplateRecord>> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM task_templates WHERE id = ?1"),
                params![id],
                template_from_row,
            )
            .optional()?;
        Ok(record)
    }
}
