mod actions;
mod chat_configs;
mod executions;
mod tasks;
mod templates;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::lifecycle::LifecycleComponent;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS task_templates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        task_type TEXT NOT NULL DEFAULT 'general',
        prompt TEXT NOT NULL,
        description TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS task_executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        template_id INTEGER NOT NULL REFERENCES task_templates(id),
        context TEXT,
        result TEXT,
        extensions_output TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        error TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        completed_at DATETIME
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT,
        task_type TEXT NOT NULL,
        prompt TEXT NOT NULL,
        context TEXT,
        result TEXT,
        extensions_output TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        error TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        completed_at DATETIME
    )",
    "CREATE TABLE IF NOT EXISTS actions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        trigger_type TEXT NOT NULL,
        template_id INTEGER REFERENCES task_templates(id),
        context_rules TEXT,
        enabled INTEGER NOT NULL DEFAULT 1,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        last_triggered_at DATETIME
    )",
    "CREATE TABLE IF NOT EXISTS chat_trigger_configs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        catch_type TEXT NOT NULL DEFAULT 'reaction',
        catch_value TEXT NOT NULL,
        message_type TEXT NOT NULL DEFAULT 'single',
        response_format TEXT NOT NULL DEFAULT 'reply',
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS action_configs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        action_id INTEGER NOT NULL REFERENCES actions(id),
        config_type TEXT NOT NULL,
        config_id INTEGER NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_task_executions_status ON task_executions(status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_chat_trigger_configs_catch ON chat_trigger_configs(catch_type, catch_value)",
    "CREATE INDEX IF NOT EXISTS idx_action_configs_config ON action_configs(config_type, config_id)",
];

/// SQLite-backed persistence for templates, executions, actions and chat
/// trigger configuration. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Store {
    pub async fn open<P: AsRef<Path>>(data_dir: P, file_name: &str) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).await?;
        }

        let db_path = data_dir.join(file_name);
        let db = Connection::open(&db_path)?;
        create_schema(&db)?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path: Some(db_path),
        })
    }

    pub async fn ping(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn create_schema(db: &Connection) -> Result<()> {
    for statement in SCHEMA {
        db.execute(statement, [])?;
    }
    Ok(())
}

/// Create an in-memory Store for testing.
#[cfg(test)]
pub fn test_store() -> Store {
    let db = Connection::open_in_memory().expect("open in-memory db");
    create_schema(&db).expect("create schema");
    Store {
        db: Arc::new(Mutex::new(db)),
        path: None,
    }
}

#[async_trait]
impl LifecycleComponent for Store {
    async fn on_init(&mut self) -> Result<()> {
        info!("Store (SQLite) initializing at {:?}...", self.path);
        self.ping().await
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("Store shutting down...");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::types::{CatchType, ExecutionStatus, TriggerType};

    #[tokio::test]
    async fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), "relay.db").await.unwrap();
        assert!(dir.path().join("relay.db").exists());
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = Store::open(dir.path(), "relay.db").await.unwrap();
            store
                .create_template("digest", "general", "Summarize", None)
                .await
                .unwrap()
                .id
        };
        let store = Store::open(dir.path(), "relay.db").await.unwrap();
        assert!(store.get_template(id).await.unwrap().is_some());
    }

    // --- Templates ---

    #[tokio::test]
    async fn template_create_and_get() {
        let store = test_store();
        let tpl = store
            .create_template("summary", "discord_summary", "Summarize: {x}", Some("d"))
            .await
            .unwrap();
        let got = store.get_template(tpl.id).await.unwrap().unwrap();
        assert_eq!(got.name, "summary");
        assert_eq!(got.task_type, "discord_summary");
        assert_eq!(got.prompt, "Summarize: {x}");
        assert_eq!(got.description.as_deref(), Some("d"));
        assert!(store.get_template(999).await.unwrap().is_none());
    }

    // --- Actions ---

    #[tokio::test]
    async fn action_enable_disable_and_stamp() {
        let store = test_store();
        let action = store
            .create_action("api hook", TriggerType::Api, None, None)
            .await
            .unwrap();
        assert!(action.enabled);
        assert!(action.last_triggered_at.is_none());

        assert!(store.set_action_enabled(action.id, false).await.unwrap());
        assert!(!store.get_action(action.id).await.unwrap().unwrap().enabled);
        assert!(!store.set_action_enabled(404, true).await.unwrap());

        store.touch_action_triggered(action.id).await.unwrap();
        let got = store.get_action(action.id).await.unwrap().unwrap();
        assert!(got.last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn action_keeps_context_rules() {
        let store = test_store();
        let rules = serde_json::json!({ "user": { "source": "sender.login" } });
        let action = store
            .create_action("hook", TriggerType::Webhook, None, Some(&rules))
            .await
            .unwrap();
        let got = store.get_action(action.id).await.unwrap().unwrap();
        assert_eq!(got.context_rules, Some(rules));
        assert_eq!(got.trigger_type, TriggerType::Webhook);
    }

    // --- Executions ---

    #[tokio::test]
    async fn execution_moves_forward_only() {
        let store = test_store();
        let tpl = store
            .create_template("t", "general", "p", None)
            .await
            .unwrap();
        let exec = store
            .create_execution(tpl.id, Some(&serde_json::json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(exec.status, ExecutionStatus::Pending);

        // pending cannot jump straight to a terminal state
        assert!(
            store
                .finish_execution(exec.id, ExecutionStatus::Completed, Some("x"), None, None)
                .await
                .is_err()
        );

        store.mark_execution_processing(exec.id).await.unwrap();
        store
            .finish_execution(
                exec.id,
                ExecutionStatus::Completed,
                Some("done"),
                Some(&serde_json::json!({"k": 1})),
                None,
            )
            .await
            .unwrap();

        let got = store.get_execution(exec.id).await.unwrap().unwrap();
        assert_eq!(got.status, ExecutionStatus::Completed);
        assert_eq!(got.result.as_deref(), Some("done"));
        assert_eq!(got.extensions_output, Some(serde_json::json!({"k": 1})));
        assert!(got.completed_at.is_some());

        // terminal records are immutable
        assert!(store.mark_execution_processing(exec.id).await.is_err());
        assert!(
            store
                .finish_execution(exec.id, ExecutionStatus::Failed, None, None, Some("late"))
                .await
                .is_err()
        );
        assert_eq!(
            store.get_execution(exec.id).await.unwrap().unwrap().error,
            None
        );
    }

    #[tokio::test]
    async fn count_executions_tracks_inserts() {
        let store = test_store();
        let tpl = store
            .create_template("t", "general", "p", None)
            .await
            .unwrap();
        assert_eq!(store.count_executions().await.unwrap(), 0);
        store.create_execution(tpl.id, None).await.unwrap();
        assert_eq!(store.count_executions().await.unwrap(), 1);
    }

    // --- Chat trigger configs ---

    #[tokio::test]
    async fn chat_config_lookup_by_reaction() {
        let store = test_store();
        let cfg = store
            .create_chat_config("approve", CatchType::Reaction, "✅", "thread", "dm")
            .await
            .unwrap();
        let found = store
            .find_chat_config(CatchType::Reaction, "✅")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, cfg.id);
        assert_eq!(found.message_type, "thread");
        assert_eq!(found.response_format, "dm");
        assert!(
            store
                .find_chat_config(CatchType::Reaction, "❌")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_chat_config(CatchType::Text, "✅")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn linked_action_requires_enabled_flag() {
        let store = test_store();
        let cfg = store
            .create_chat_config("c", CatchType::Reaction, "👀", "single", "reply")
            .await
            .unwrap();
        let action = store
            .create_action("a", TriggerType::Chat, None, None)
            .await
            .unwrap();
        store
            .link_action_config(action.id, CHAT_CONFIG_TYPE, cfg.id)
            .await
            .unwrap();

        let linked = store
            .get_action_by_config(CHAT_CONFIG_TYPE, cfg.id)
            .await
            .unwrap();
        assert_eq!(linked.map(|a| a.id), Some(action.id));

        store.set_action_enabled(action.id, false).await.unwrap();
        assert!(
            store
                .get_action_by_config(CHAT_CONFIG_TYPE, cfg.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn deleting_chat_config_keeps_executions() {
        let store = test_store();
        let tpl = store
            .create_template("t", "general", "p", None)
            .await
            .unwrap();
        let cfg = store
            .create_chat_config("c", CatchType::Reaction, "🔥", "single", "reply")
            .await
            .unwrap();
        let action = store
            .create_action("a", TriggerType::Chat, Some(tpl.id), None)
            .await
            .unwrap();
        store
            .link_action_config(action.id, CHAT_CONFIG_TYPE, cfg.id)
            .await
            .unwrap();
        let exec = store.create_execution(tpl.id, None).await.unwrap();

        assert!(store.delete_chat_config(cfg.id).await.unwrap());
        assert!(store.get_chat_config(cfg.id).await.unwrap().is_none());
        assert!(
            store
                .get_action_by_config(CHAT_CONFIG_TYPE, cfg.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.get_execution(exec.id).await.unwrap().is_some());
        assert!(!store.delete_chat_config(cfg.id).await.unwrap());
    }

    #[tokio::test]
    async fn list_chat_configs_filters_by_catch_types() {
        let store = test_store();
        store
            .create_chat_config("r", CatchType::Reaction, "✅", "single", "reply")
            .await
            .unwrap();
        store
            .create_chat_config("t", CatchType::Text, "summarize", "conversation", "reply")
            .await
            .unwrap();
        store
            .create_chat_config("m", CatchType::TextWithMention, "tldr", "single", "dm")
            .await
            .unwrap();
        let text = store
            .list_chat_configs_by_catch_types(&[CatchType::Text, CatchType::TextWithMention])
            .await
            .unwrap();
        assert_eq!(text.len(), 2);
        assert!(text.iter().all(|c| c.catch_type != CatchType::Reaction));
        assert_eq!(text[0].name, "t");

        let reactions = store
            .list_chat_configs_by_catch_types(&[CatchType::Reaction])
            .await
            .unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].catch_value, "✅");
        assert!(
            store
                .list_chat_configs_by_catch_types(&[])
                .await
                .unwrap()
                .is_empty()
        );
    }

    // --- Standalone tasks ---

    #[tokio::test]
    async fn task_created_in_processing() {
        let store = test_store();
        let task = store
            .create_task(Some("adhoc"), "api_request", "do it", None)
            .await
            .unwrap();
        assert_eq!(task.status, ExecutionStatus::Processing);
        store
            .finish_task(task.id, ExecutionStatus::Failed, None, None, Some("boom"))
            .await
            .unwrap();
        let got = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(got.status, ExecutionStatus::Failed);
        assert_eq!(got.error.as_deref(), Some("boom"));
        assert!(got.result.is_none());
        assert!(got.completed_at.is_some());
    }

    use crate::core::store::types::CHAT_CONFIG_TYPE;
}
