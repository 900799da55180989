use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, info, warn};

static ESC_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("escape sequence pattern")
});

static BARE_SGR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:[0-9]{1,3}(?:;[0-9]{1,3})*)?m").expect("bare color pattern")
});

static STARTUP_BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^.*starting session.*\n.*logging to.*\n.*working directory.*\n")
        .expect("banner pattern")
});

/// One agent invocation.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub text: String,
    pub session_name: Option<String>,
    pub resume: bool,
    pub extensions: Vec<String>,
}

impl RunRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// What came back from the agent process.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub success: bool,
    /// Cleaned stdout on success, empty otherwise.
    pub stdout: String,
    /// Raw stderr (or the spawn error) on failure.
    pub stderr: Option<String>,
}

impl Invocation {
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: Some(stderr.into()),
        }
    }
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_with_text(&self, request: &RunRequest) -> Invocation;

    async fn version(&self) -> Result<String>;
}

/// Runs the external agent CLI as a child process.
pub struct ProcessInvoker {
    binary: String,
}

impl ProcessInvoker {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn build_args(request: &RunRequest) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--text".to_string(),
            request.text.clone(),
        ];
        if let Some(name) = &request.session_name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        if request.resume {
            args.push("--resume".to_string());
        }
        for ext in &request.extensions {
            args.push("--with-builtin".to_string());
            args.push(ext.clone());
        }
        args
    }
}

#[async_trait]
impl AgentRunner for ProcessInvoker {
    async fn run_with_text(&self, request: &RunRequest) -> Invocation {
        let args = Self::build_args(request);
        info!(
            "Invoking agent [{}] (session: {:?}, extensions: {:?})",
            self.binary, request.session_name, request.extensions
        );

        // TODO: add a configurable timeout once a policy for hung agents is agreed on
        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn agent [{}]: {}", self.binary, e);
                return Invocation::failed(e.to_string());
            }
        };

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to collect agent output: {}", e);
                return Invocation::failed(e.to_string());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!("Agent exited with {}: {}", output.status, stderr.trim());
            return Invocation::failed(stderr);
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        debug!("Agent produced {} bytes of stdout", raw.len());
        Invocation {
            success: true,
            stdout: clean_output(&raw),
            stderr: None,
        }
    }

    async fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "{} --version failed: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(clean_output(&String::from_utf8_lossy(&output.stdout))
            .trim()
            .to_string())
    }
}

pub fn strip_ansi_codes(text: &str) -> String {
    let without_esc = ESC_SEQUENCE.replace_all(text, "");
    BARE_SGR.replace_all(&without_esc, "").into_owned()
}

pub fn strip_startup_banner(text: &str) -> String {
    STARTUP_BANNER.replace_all(text, "").into_owned()
}

/// Strip escape sequences and the startup banner until nothing changes.
/// Removing one sequence can splice two fragments into a new one, so a
/// single pass is not enough to make this idempotent.
pub fn clean_output(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = strip_startup_banner(&strip_ansi_codes(&current));
        if next == current {
            return next;
        }
        current = next;
    }
}
