pub mod extraction;

use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::core::executor::ExecutionResult;
use crate::core::store::Store;
use crate::core::store::types::ExecutionStatus;
use crate::core::tracker::Tracker;
use extraction::{ExtractionRules, extract_context};

/// Why a trigger did not run. None of these leave side effects behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    ActionNotFound(i64),
    ActionDisabled(i64),
    TemplateNotFound(i64),
}

impl Rejection {
    pub fn message(&self) -> String {
        match self {
            Self::ActionNotFound(id) => format!("Action {} not found", id),
            Self::ActionDisabled(id) => format!("Action {} is disabled", id),
            Self::TemplateNotFound(id) => format!("Template {} not found", id),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "success": false, "error": self.message() })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Dispatched {
    pub action_id: i64,
    pub template_id: i64,
    pub execution_id: i64,
    pub status: ExecutionStatus,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Dispatched(Dispatched),
    Rejected(Rejection),
}

impl DispatchOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Dispatched(d) => serde_json::to_value(d)
                .unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() })),
            Self::Rejected(r) => r.to_json(),
        }
    }
}

/// Turns a trigger on an Action into a tracked template execution.
#[derive(Clone)]
pub struct ActionDispatcher {
    store: Store,
    tracker: Tracker,
}

impl ActionDispatcher {
    pub fn new(store: Store, tracker: Tracker) -> Self {
        Self { store, tracker }
    }

    pub async fn trigger(
        &self,
        action_id: i64,
        payload: &Value,
        extensions: &[String],
    ) -> Result<DispatchOutcome> {
        let Some(action) = self.store.get_action(action_id).await? else {
            return Ok(DispatchOutcome::Rejected(Rejection::ActionNotFound(action_id)));
        };
        if !action.enabled {
            info!("Action {} ({}) is disabled; ignoring trigger", action.id, action.name);
            return Ok(DispatchOutcome::Rejected(Rejection::ActionDisabled(action_id)));
        }

        let template = match action.template_id {
            Some(id) => self.store.get_template(id).await?,
            None => None,
        };
        let Some(template) = template else {
            return Ok(DispatchOutcome::Rejected(Rejection::TemplateNotFound(
                action.template_id.unwrap_or_default(),
            )));
        };

        let rules = match &action.context_rules {
            Some(raw) => match ExtractionRules::from_value(raw) {
                Ok(rules) => Some(rules),
                Err(e) => {
                    warn!(
                        "Action {} has unreadable context rules, passing payload through: {}",
                        action.id, e
                    );
                    None
                }
            },
            None => None,
        };
        let context = extract_context(payload, rules.as_ref());

        if let Err(e) = self.store.touch_action_triggered(action.id).await {
            warn!("Could not stamp last trigger time for action {}: {}", action.id, e);
        }

        info!(
            "Action {} ({}) triggered -> template {}",
            action.id, action.name, template.id
        );
        let tracked = self
            .tracker
            .execute_with_template(&template, Some(&context), extensions)
            .await?;

        Ok(DispatchOutcome::Dispatched(Dispatched {
            action_id: action.id,
            template_id: template.id,
            execution_id: tracked.execution_id,
            status: tracked.status,
            result: tracked.result,
        }))
    }
}
