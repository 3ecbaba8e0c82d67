//! Shell command probe.

use super::{ProbeBase, ProbeError, ProbeSettings, Prober, TextChecker};
use crate::result::ProbeResult;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const MAX_MESSAGE_LEN: usize = 512;

/// Runs a program; healthy when it exits zero and its output passes the
/// text checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellProber {
    #[serde(flatten)]
    pub base: ProbeBase,
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// `KEY=VALUE` pairs added to the environment.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(flatten)]
    pub text: TextChecker,
}

impl ShellProber {
    pub fn new(name: &str, cmd: &str, args: &[&str]) -> Self {
        Self {
            base: ProbeBase::new(name),
            cmd: cmd.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    async fn check(&self) -> Result<String, ProbeError> {
        let mut command = Command::new(&self.cmd);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for pair in &self.env {
            if let Some((key, value)) = pair.split_once('=') {
                command.env(key, value);
            }
        }

        let output = command
            .output()
            .await
            .map_err(|e| ProbeError::Command(format!("{}: {}", self.cmd, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(ProbeError::Command(format!(
                "exit code {}: {}",
                code,
                truncate(stderr.trim())
            )));
        }

        self.text.check(&stdout)?;
        Ok(truncate(stdout.trim()))
    }
}

fn truncate(s: &str) -> String {
    if s.len() <= MAX_MESSAGE_LEN {
        return s.to_string();
    }
    let mut end = MAX_MESSAGE_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[async_trait]
impl Prober for ShellProber {
    fn kind(&self) -> &str {
        self.base.kind()
    }

    fn name(&self) -> &str {
        &self.base.name
    }

    fn channels(&self) -> Vec<String> {
        self.base.channels()
    }

    fn config(&mut self, settings: &ProbeSettings) -> Result<(), ProbeError> {
        if self.cmd.trim().is_empty() {
            return Err(ProbeError::Config(format!(
                "shell prober '{}' has no command",
                self.base.name
            )));
        }
        self.text.config()?;
        let endpoint = std::iter::once(self.cmd.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.base.configure("shell", &endpoint, settings)
    }

    async fn probe(&mut self) -> ProbeResult {
        let observation = self.base.observe(self.check()).await;
        self.base.record(observation)
    }

    fn interval(&self) -> Duration {
        self.base.interval()
    }

    fn result(&self) -> &ProbeResult {
        self.base.result()
    }

    fn result_mut(&mut self) -> &mut ProbeResult {
        self.base.result_mut()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::status::Status;

    #[tokio::test]
    async fn test_shell_probe_exit_codes() {
        let mut ok = ShellProber::new("true", "sh", &["-c", "echo healthy"]);
        ok.text.contain = "healthy".into();
        ok.config(&ProbeSettings::default()).unwrap();
        let result = ok.probe().await;
        assert_eq!(result.status, Status::Up);
        assert_eq!(result.message, "healthy");

        let mut bad = ShellProber::new("false", "sh", &["-c", "echo broken >&2; exit 3"]);
        bad.config(&ProbeSettings::default()).unwrap();
        let result = bad.probe().await;
        assert_eq!(result.status, Status::Down);
        assert!(result.message.contains("exit code 3"));
        assert!(result.message.contains("broken"));
    }

    #[tokio::test]
    async fn test_shell_probe_env_and_not_contain() {
        let mut prober = ShellProber::new("env", "sh", &["-c", "echo $PW_STATE"]);
        prober.env = vec!["PW_STATE=degraded".into()];
        prober.text.not_contain = "degraded".into();
        prober.config(&ProbeSettings::default()).unwrap();
        let result = prober.probe().await;
        assert_eq!(result.status, Status::Down);
    }

    #[test]
    fn test_truncate_long_output() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 10);
        assert_eq!(truncate(&long).len(), MAX_MESSAGE_LEN + 3);
    }
}
