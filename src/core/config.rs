use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::Level;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_api_host")]
    pub api_host: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Executable invoked for every task.
    #[serde(default = "default_agent_binary")]
    pub agent_binary: String,

    #[serde(default)]
    pub discord_token: Option<String>,

    /// Start the chat bot together with `serve`.
    #[serde(default)]
    pub discord_autostart: bool,

    /// HMAC key for `/api/webhooks/{id}`; signatures are not checked when unset.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(skip)]
    pub data_dir: PathBuf,
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
    8001
}
fn default_database_file() -> String {
    "taskrelay.db".to_string()
}
fn default_agent_binary() -> String {
    "goose".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            api_port: default_api_port(),
            database_file: default_database_file(),
            agent_binary: default_agent_binary(),
            discord_token: None,
            discord_autostart: false,
            webhook_secret: None,
            log_level: default_log_level(),
            data_dir: PathBuf::new(),
        }
    }
}

/// `TASKRELAY_DATA_DIR`, or `~/.taskrelay`.
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TASKRELAY_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(".taskrelay"))
}

impl AppConfig {
    /// Read `config.toml` from `data_dir` (defaults when absent), then apply
    /// environment overrides.
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let config_path = data_dir.join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path).await?;
            toml::from_str::<AppConfig>(&content)
                .map_err(|e| anyhow::anyhow!("Invalid {}: {}", config_path.display(), e))?
        } else {
            AppConfig::default()
        };
        config.data_dir = data_dir.to_path_buf();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = non_empty("TASKRELAY_DISCORD_TOKEN") {
            self.discord_token = Some(token);
        }
        if let Some(bin) = non_empty("TASKRELAY_AGENT_BIN") {
            self.agent_binary = bin;
        }
        if let Some(secret) = non_empty("TASKRELAY_WEBHOOK_SECRET") {
            self.webhook_secret = Some(secret);
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn max_log_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}
