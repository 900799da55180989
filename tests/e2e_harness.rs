#![cfg(unix)]
#![allow(dead_code)]

use serde_json::{Value, json};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Stand-in for the agent CLI: answers `--version`, records the prompt it was
/// given next to itself and prints a result with structured output.
const FAKE_AGENT: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "fake-agent 1.0.0"
  exit 0
fi
printf '%s' "$3" > "$(dirname "$0")/last_prompt.txt"
printf 'Done.\nEXTENSION_OUTPUT: {"k":1}\n'
"#;

pub struct ServeHarness {
    child: Child,
    pub api_port: u16,
    pub api_base: String,
    data_dir: tempfile::TempDir,
}

impl ServeHarness {
    pub async fn spawn() -> TestResult<Self> {
        let api_port = find_free_port()?;
        let data_dir = tempfile::tempdir()?;
        let agent = write_fake_agent(data_dir.path())?;
        let log_file = std::fs::File::create(data_dir.path().join("serve.log"))?;
        let log_file_err = log_file.try_clone()?;

        let child = Command::new(env!("CARGO_BIN_EXE_taskrelay"))
            .arg("serve")
            .arg("--api-host")
            .arg("127.0.0.1")
            .arg("--api-port")
            .arg(api_port.to_string())
            .env("TASKRELAY_DATA_DIR", data_dir.path())
            .env("TASKRELAY_AGENT_BIN", &agent)
            .env_remove("TASKRELAY_DISCORD_TOKEN")
            .env_remove("TASKRELAY_WEBHOOK_SECRET")
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_file_err))
            .spawn()?;

        let mut harness = Self {
            child,
            api_port,
            api_base: format!("http://127.0.0.1:{}", api_port),
            data_dir,
        };
        harness.wait_until_ready().await?;
        Ok(harness)
    }

    pub fn data_dir(&self) -> &Path {
        self.data_dir.path()
    }

    pub fn last_prompt(&self) -> TestResult<String> {
        Ok(std::fs::read_to_string(
            self.data_dir.path().join("last_prompt.txt"),
        )?)
    }

    async fn wait_until_ready(&mut self) -> TestResult<()> {
        for _ in 0..80 {
            if let Some(status) = self.child.try_wait()? {
                let log = std::fs::read_to_string(self.data_dir.path().join("serve.log"))
                    .unwrap_or_default();
                return Err(format!("taskrelay exited early ({}):\n{}", status, log).into());
            }

            let res = reqwest::Client::new()
                .get(format!("{}/api/health/ping", self.api_base))
                .timeout(Duration::from_millis(700))
                .send()
                .await;
            if let Ok(resp) = res
                && resp.status().is_success()
            {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        Err("Timed out waiting for taskrelay API readiness".into())
    }

    pub async fn request_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> TestResult<Value> {
        let url = format!("{}{}", self.api_base, path);
        let mut req = reqwest::Client::new()
            .request(method, &url)
            .timeout(Duration::from_secs(30));
        if let Some(payload) = body {
            req = req.json(&payload);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        Ok(serde_json::from_str::<Value>(&text).unwrap_or_else(|_| {
            json!({
                "success": false,
                "raw": text,
                "error": format!("non-json response status={}", status)
            })
        }))
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResult<Value> {
        self.request_json(reqwest::Method::POST, path, Some(body))
            .await
    }

    pub async fn get(&self, path: &str) -> TestResult<Value> {
        self.request_json(reqwest::Method::GET, path, None).await
    }
}

impl Drop for ServeHarness {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn find_free_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

pub fn ensure_success(value: &Value, action: &str) -> TestResult<()> {
    if value.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    Err(format!("{} failed: {}", action, value).into())
}

fn write_fake_agent(dir: &Path) -> TestResult<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-agent.sh");
    std::fs::write(&path, FAKE_AGENT)?;
    let mut perms = std::fs::metadata(&path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms)?;
    Ok(path)
}
