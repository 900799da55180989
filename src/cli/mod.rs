mod admin;
mod serve;

use anyhow::{Result, bail};
use console::style;
use serde_json::Value;

use crate::core::config::{AppConfig, resolve_data_dir};
use crate::core::terminal::{self, GuideSection};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Service")
        .command("serve", "Start the HTTP API and the Discord bot")
        .text("  --api-host <host>   --api-port <port>")
        .print();

    GuideSection::new("One-shot")
        .command("run", "Run a prompt through the agent and record it")
        .text("  --prompt <text> [--context <json>] [--session <name>] [--extension <name>]")
        .command("trigger", "Fire an action with a payload")
        .text("  --action <id> [--payload <json>]")
        .print();

    GuideSection::new("Admin")
        .command("template add", "--name <n> --prompt <text> [--type <t>]")
        .command("action add", "--name <n> --trigger api|chat|webhook [--template <id>] [--rules <json>]")
        .command("action enable <id>", "Enable an action")
        .command("action disable <id>", "Disable an action")
        .command("chat-config add", "--name <n> --catch-value <v> [--catch-type <t>] [--action <id>]")
        .blank()
        .hint("taskrelay trigger --action 3 --payload '{\"issue\":{\"title\":\"Crash\"}}'")
        .print();

    println!(
        "\n {} {} <command> [subcommand] [flags]\n",
        style("Usage:").bold(),
        style("taskrelay").green()
    );
}

/// `--flag value` pairs and bare positionals, in order of appearance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Flags {
    values: Vec<(String, String)>,
    positional: Vec<String>,
}

impl Flags {
    /// Last value given for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn all(&self, name: &str) -> Vec<String> {
        self.values
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn require(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => bail!("{} is required", name),
        }
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>> {
        self.get(name)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| anyhow::anyhow!("{} expects a number, got '{}'", name, v))
            })
            .transpose()
    }

    pub fn json(&self, name: &str) -> Result<Option<Value>> {
        self.get(name)
            .map(|v| {
                serde_json::from_str(v)
                    .map_err(|e| anyhow::anyhow!("{} is not valid JSON: {}", name, e))
            })
            .transpose()
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }
}

pub(crate) fn parse_flags(args: &[String], start: usize) -> Flags {
    let mut flags = Flags::default();
    let mut i = start;
    while i < args.len() {
        let arg = &args[i];
        if arg.starts_with("--") {
            if i + 1 < args.len() && !args[i + 1].starts_with("--") {
                flags.values.push((arg.clone(), args[i + 1].clone()));
                i += 2;
            } else {
                flags.values.push((arg.clone(), String::new()));
                i += 1;
            }
        } else {
            flags.positional.push(arg.clone());
            i += 1;
        }
    }
    flags
}

pub(crate) fn parse_api_server_flags(
    args: &[String],
    start: usize,
    mut api_host: String,
    mut api_port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().unwrap_or(api_port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    api_host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (api_host, api_port)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    if matches!(command, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let data_dir = resolve_data_dir()?;
    tokio::fs::create_dir_all(&data_dir).await?;
    let mut config = AppConfig::load(&data_dir).await?;
    let sub = args.get(2).map(String::as_str).unwrap_or("");

    match (command, sub) {
        ("serve", _) => {
            let (api_host, api_port) =
                parse_api_server_flags(&args, 2, config.api_host.clone(), config.api_port);
            config.api_host = api_host;
            config.api_port = api_port;
            terminal::print_banner();
            serve::run_serve(config).await
        }
        ("run", _) => admin::run_prompt(&config, &parse_flags(&args, 2)).await,
        ("trigger", _) => admin::trigger_action(&config, &parse_flags(&args, 2)).await,
        ("template", "add") => admin::add_template(&config, &parse_flags(&args, 3)).await,
        ("action", "add") => admin::add_action(&config, &parse_flags(&args, 3)).await,
        ("action", "enable") => {
            admin::set_action_enabled(&config, &parse_flags(&args, 3), true).await
        }
        ("action", "disable") => {
            admin::set_action_enabled(&config, &parse_flags(&args, 3), false).await
        }
        ("chat-config", "add") => admin::add_chat_config(&config, &parse_flags(&args, 3)).await,
        _ => {
            print_help();
            bail!("Unknown command: {} {}", command, sub)
        }
    }
}
