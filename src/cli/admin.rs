use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::{Value, json};

use super::Flags;
use super::serve::Services;
use crate::core::config::AppConfig;
use crate::core::dispatcher::extraction::ExtractionRules;
use crate::core::store::types::{CHAT_CONFIG_TYPE, CatchType, TriggerType};
use crate::core::terminal;
use crate::core::tracker::TaskSpec;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_prompt(config: &AppConfig, flags: &Flags) -> Result<()> {
    let spec = TaskSpec {
        name: flags.get("--name").map(str::to_string),
        task_type: flags.get("--type").unwrap_or("cli_request").to_string(),
        prompt: flags.require("--prompt")?.to_string(),
        context: flags.json("--context")?,
        extensions: flags.all("--extension"),
        session_name: flags.get("--session").map(str::to_string),
    };
    let services = Services::open(config).await?;
    let tracked = services.tracker.run_task(&spec).await?;
    print_json(&tracked)?;
    if !tracked.result.success {
        bail!("Task {} failed", tracked.task_id);
    }
    Ok(())
}

pub async fn trigger_action(config: &AppConfig, flags: &Flags) -> Result<()> {
    let action_id = flags
        .int("--action")?
        .ok_or_else(|| anyhow::anyhow!("--action is required"))?;
    let payload = flags.json("--payload")?.unwrap_or_else(|| json!({}));
    let services = Services::open(config).await?;
    let outcome = services
        .dispatcher
        .trigger(action_id, &payload, &flags.all("--extension"))
        .await?;
    let body = outcome.to_json();
    print_json(&body)?;
    if body["success"] != Value::Bool(true) {
        bail!("Action {} did not complete", action_id);
    }
    Ok(())
}

pub async fn add_template(config: &AppConfig, flags: &Flags) -> Result<()> {
    let name = flags.require("--name")?;
    let prompt = flags.require("--prompt")?;
    let services = Services::open(config).await?;
    let template = services
        .store
        .create_template(
            name,
            flags.get("--type").unwrap_or("general"),
            prompt,
            flags.get("--description"),
        )
        .await?;
    terminal::print_success(&format!("Template {} created", template.id));
    print_json(&template)
}

pub async fn add_action(config: &AppConfig, flags: &Flags) -> Result<()> {
    let name = flags.require("--name")?;
    let trigger = flags.get("--trigger").unwrap_or("api");
    let Some(trigger_type) = TriggerType::parse(trigger) else {
        bail!("--trigger must be one of api, chat, webhook");
    };
    let rules = flags.json("--rules")?;
    if let Some(rules) = &rules {
        ExtractionRules::from_value(rules)
            .map_err(|e| anyhow::anyhow!("Invalid --rules: {}", e))?;
    }

    let services = Services::open(config).await?;
    let template_id = flags.int("--template")?;
    if let Some(id) = template_id
        && services.store.get_template(id).await?.is_none()
    {
        bail!("Template {} not found", id);
    }
    let action = services
        .store
        .create_action(name, trigger_type, template_id, rules.as_ref())
        .await?;
    terminal::print_success(&format!("Action {} created", action.id));
    print_json(&action)
}

pub async fn set_action_enabled(config: &AppConfig, flags: &Flags, enabled: bool) -> Result<()> {
    let Some(id) = flags.positional().first() else {
        bail!("Usage: taskrelay action enable|disable <id>");
    };
    let id: i64 = id
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid action id '{}'", id))?;
    let services = Services::open(config).await?;
    if !services.store.set_action_enabled(id, enabled).await? {
        bail!("Action {} not found", id);
    }
    let verb = if enabled { "enabled" } else { "disabled" };
    terminal::print_success(&format!("Action {} {}", id, verb));
    Ok(())
}

pub async fn add_chat_config(config: &AppConfig, flags: &Flags) -> Result<()> {
    let name = flags.require("--name")?;
    let catch_value = flags.require("--catch-value")?;
    let catch_type = flags.get("--catch-type").unwrap_or("reaction");
    let Some(catch_type) = CatchType::parse(catch_type) else {
        bail!("--catch-type must be one of reaction, text, textWithMention");
    };

    let services = Services::open(config).await?;
    let action_id = flags.int("--action")?;
    if let Some(id) = action_id
        && services.store.get_action(id).await?.is_none()
    {
        bail!("Action {} not found", id);
    }
    let record = services
        .store
        .create_chat_config(
            name,
            catch_type,
            catch_value,
            flags.get("--message-type").unwrap_or("single"),
            flags.get("--response-format").unwrap_or("reply"),
        )
        .await?;
    if let Some(id) = action_id {
        services
            .store
            .link_action_config(id, CHAT_CONFIG_TYPE, record.id)
            .await?;
    }
    terminal::print_success(&format!("Chat config {} created", record.id));
    print_json(&record)
}
