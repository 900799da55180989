use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};
use serde_json::Value;

use super::Store;
use super::types::{ActionRecord, TriggerType, json_column};

const ACTION_COLUMNS: &str =
    "id, name, trigger_type, template_id, context_rules, enabled, created_at, last_triggered_at";

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<ActionRecord> {
    let trigger: String = row.get(2)?;
    let trigger_type = TriggerType::parse(&trigger).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown trigger type '{}'", trigger).into(),
        )
    })?;
    Ok(ActionRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        trigger_type,
        template_id: row.get(3)?,
        context_rules: json_column(row.get(4)?),
        enabled: row.get::<_, i32>(5)? != 0,
        created_at: row.get(6)?,
        last_triggered_at: row.get(7)?,
    })
}

impl Store {
    pub async fn create_action(
        &self,
        name: &str,
        trigger_type: TriggerType,
        template_id: Option<i64>,
        context_rules: Option<&Value>,
    ) -> Result<ActionRecord> {
        let rules = context_rules.map(serde_json::to_string).transpose()?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO actions (name, trigger_type, template_id, context_rules, enabled) VALUES (?1, ?2, ?3, ?4, 1)",
            params![name, trigger_type.as_str(), template_id, rules],
        )?;
        let id = db.last_insert_rowid();
        let record = db.query_row(
            &format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?1"),
            params![id],
            action_from_row,
        )?;
        Ok(record)
    }

    pub async fn get_action(&self, id: i64) -> Result<Option<ActionRecord>> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                &format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?1"),
                params![id],
                action_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub async fn set_action_enabled(&self, id: i64, enabled: bool) -> Result<bool> {
        let db = self.db.lock().await;
        let rows_updated = db.execute(
            "UPDATE actions SET enabled = ?1 WHERE id = ?2",
            params![enabled as i32, id],
        )?;
        Ok(rows_updated > 0)
    }

    pub async fn touch_action_triggered(&self, id: i64) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE actions SET last_triggered_at = CURRENT_TIMESTAMP WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Bind an Action to a trigger config of the given type.
    pub async fn link_action_config(
        &self,
        action_id: i64,
        config_type: &str,
        config_id: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO action_configs (action_id, config_type, config_id) VALUES (?1, ?2, ?3)",
            params![action_id, config_type, config_id],
        )?;
        Ok(())
    }

    /// Resolve the enabled Action bound to a trigger config. Disabled Actions
    /// are never returned.
    pub async fn get_action_by_config(
        &self,
        config_type: &str,
        config_id: i64,
    ) -> Result<Option<ActionRecord>> {
        let db = self.db.lock().await;
        let columns = ACTION_COLUMNS
            .split(", ")
            .map(|c| format!("a.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let record = db
            .query_row(
                &format!(
                    "SELECT {columns} FROM actions a
                     JOIN action_configs ac ON ac.action_id = a.id
                     WHERE ac.config_type = ?1 AND ac.config_id = ?2 AND a.enabled = 1
                     ORDER BY ac.id LIMIT 1"
                ),
                params![config_type, config_id],
                action_from_row,
            )
            .optional()?;
        Ok(record)
    }
}
