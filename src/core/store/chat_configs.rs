use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::Store;
use super::types::{CHAT_CONFIG_TYPE, CatchType, ChatTriggerConfigRecord};

const CHAT_CONFIG_COLUMNS: &str =
    "id, name, catch_type, catch_value, message_type, response_format, created_at";

fn chat_config_from_row(row: &Row<'_>) -> rusqlite::Result<ChatTriggerConfigRecord> {
    let catch: String = row.get(2)?;
    let catch_type = CatchType::parse(&catch).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown catch type '{}'", catch).into(),
        )
    })?;
    Ok(ChatTriggerConfigRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        catch_type,
        catch_value: row.get(3)?,
        message_type: row.get(4)?,
        response_format: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl Store {
    pub async fn create_chat_config(
        &self,
        name: &str,
        catch_type: CatchType,
        catch_value: &str,
        message_type: &str,
        response_format: &str,
    ) -> Result<ChatTriggerConfigRecord> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO chat_trigger_configs (name, catch_type, catch_value, message_type, response_format)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                catch_type.as_str(),
                catch_value,
                message_type,
                response_format
            ],
        )?;
        let id = db.last_insert_rowid();
        let record = db.query_row(
            &format!("SELECT {CHAT_CONFIG_COLUMNS} FROM chat_trigger_configs WHERE id = ?1"),
            params![id],
            chat_config_from_row,
        )?;
        Ok(record)
    }

    pub async fn get_chat_config(&self, id: i64) -> Result<Option<ChatTriggerConfigRecord>> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                &format!("SELECT {CHAT_CONFIG_COLUMNS} FROM chat_trigger_configs WHERE id = ?1"),
                params![id],
                chat_config_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Exact lookup used for reaction triggers.
    pub async fn find_chat_config(
        &self,
        catch_type: CatchType,
        catch_value: &str,
    ) -> Result<Option<ChatTriggerConfigRecord>> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                &format!(
                    "SELECT {CHAT_CONFIG_COLUMNS} FROM chat_trigger_configs
                     WHERE catch_type = ?1 AND catch_value = ?2 ORDER BY id LIMIT 1"
                ),
                params![catch_type.as_str(), catch_value],
                chat_config_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// All configs whose catch type is one of `catch_types`, oldest first.
    pub async fn list_chat_configs_by_catch_types(
        &self,
        catch_types: &[CatchType],
    ) -> Result<Vec<ChatTriggerConfigRecord>> {
        if catch_types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; catch_types.len()].join(", ");
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {CHAT_CONFIG_COLUMNS} FROM chat_trigger_configs
             WHERE catch_type IN ({placeholders}) ORDER BY id"
        ))?;
        let rows = stmt.query_map(
            params_from_iter(catch_types.iter().map(|c| c.as_str())),
            chat_config_from_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Delete a config together with its action associations. Executions
    /// that came out of it are kept.
    pub async fn delete_chat_config(&self, id: i64) -> Result<bool> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        tx.execute(
            "DELETE FROM action_configs WHERE config_type = ?1 AND config_id = ?2",
            params![CHAT_CONFIG_TYPE, id],
        )?;
        let rows_deleted = tx.execute(
            "DELETE FROM chat_trigger_configs WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;
        Ok(rows_deleted > 0)
    }
}
