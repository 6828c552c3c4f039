// file: src/utils/command.rs
// version: 1.0.0
// guid: c41f7e02-9b3d-4a68-8e2f-5d07b9a1c6e4

//! External command execution.
//!
//! Every interaction with `apt-get`, `systemctl`, `ufw` and friends goes
//! through a [`CommandRunner`], so a run can be executed for real, recorded
//! as a dry-run plan, or scripted in tests.

use crate::error::SetupError;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// A command to run: program, arguments, extra environment and optional stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
        }
    }

    /// `bash -c <script>`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("bash").arg("-c").arg(script)
    }

    /// Run a login shell script as another user
    pub fn as_user(user: &str, script: impl Into<String>) -> Self {
        Self::new("sudo")
            .args(["-u", user, "-H", "bash", "-lc"])
            .arg(script)
    }

    /// Non-interactive `apt-get` invocation
    pub fn apt_get<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("apt-get")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .args(args)
    }

    /// `systemctl <args>`
    pub fn systemctl<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("systemctl").args(args)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Human readable command line
    pub fn display(&self) -> String {
        let mut line = String::new();
        for (key, value) in &self.env {
            line.push_str(&format!("{}={} ", key, value));
        }
        line.push_str(&self.program);
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!(" '{}'", arg));
            } else {
                line.push(' ');
                line.push_str(arg);
            }
        }
        line
    }
}

impl std::fmt::Display for Cmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    async fn run(&self, cmd: &Cmd) -> Result<CommandOutput>;

    /// Run a command and fail on a non-zero exit, returning stdout
    async fn run_checked(&self, cmd: &Cmd) -> Result<String> {
        let output = self.run(cmd).await?;
        if !output.success() {
            return Err(SetupError::execution(format!(
                "`{}` failed with exit code {}: {}",
                cmd,
                output.code.unwrap_or(-1),
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Whether commands only get recorded
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Runs commands on the host through `tokio::process`
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, cmd: &Cmd) -> Result<CommandOutput> {
        debug!("Executing command: {}", cmd);

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &cmd.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| {
            SetupError::execution(format!("Failed to spawn {}: {}", cmd.program, e))
        })?;

        if let (Some(input), Some(mut stdin)) = (&cmd.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                SetupError::timeout(format!(
                    "`{}` timed out after {} seconds",
                    cmd,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| SetupError::execution(format!("`{}` failed: {}", cmd, e)))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

struct ScriptedResponse {
    needle: String,
    outputs: VecDeque<CommandOutput>,
}

/// Records commands instead of executing them.
///
/// Used for `--dry-run`, where the recorded commands form the plan shown to
/// the operator. Responses can be scripted per command-line substring; the
/// last scripted output for a match repeats. Unmatched commands succeed with
/// empty output.
#[derive(Default)]
pub struct RecordingRunner {
    recorded: Mutex<Vec<Cmd>>,
    responses: Mutex<Vec<ScriptedResponse>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outputs returned for commands whose line contains `needle`
    pub fn respond(&self, needle: impl Into<String>, outputs: Vec<CommandOutput>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push(ScriptedResponse {
                needle: needle.into(),
                outputs: outputs.into(),
            });
        }
    }

    /// Commands seen so far, in order
    pub fn recorded(&self) -> Vec<Cmd> {
        self.recorded.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Recorded command lines, in order
    pub fn recorded_lines(&self) -> Vec<String> {
        self.recorded().iter().map(Cmd::display).collect()
    }

    /// Number of recorded commands whose line contains `needle`
    pub fn count_matching(&self, needle: &str) -> usize {
        self.recorded_lines()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, cmd: &Cmd) -> Result<CommandOutput> {
        let line = cmd.display();
        info!("DRY RUN: would execute: {}", line);

        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(cmd.clone());
        }

        let mut responses = self
            .responses
            .lock()
            .map_err(|_| SetupError::system("Recording runner lock poisoned"))?;
        for response in responses.iter_mut() {
            if line.contains(&response.needle) {
                let output = if response.outputs.len() > 1 {
                    response.outputs.pop_front()
                } else {
                    response.outputs.front().cloned()
                };
                return Ok(output.unwrap_or_default());
            }
        }

        Ok(CommandOutput::ok(""))
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmd_display_quotes_whitespace() {
        let cmd = Cmd::apt_get(["install", "-y", "nginx"]);
        assert_eq!(
            cmd.display(),
            "DEBIAN_FRONTEND=noninteractive apt-get install -y nginx"
        );

        let cmd = Cmd::shell("echo hello");
        assert_eq!(cmd.display(), "bash -c 'echo hello'");
    }

    #[test]
    fn test_as_user() {
        let cmd = Cmd::as_user("dev", "nvm install --lts");
        assert_eq!(cmd.program, "sudo");
        assert_eq!(cmd.args[..5], ["-u", "dev", "-H", "bash", "-lc"]);
    }

    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemRunner::new(Duration::from_secs(10));
        let output = runner.run(&Cmd::shell("echo out; echo err >&2")).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_system_runner_feeds_stdin() {
        let runner = SystemRunner::new(Duration::from_secs(10));
        let output = runner.run(&Cmd::new("cat").stdin("piped")).await.unwrap();
        assert_eq!(output.stdout, "piped");
    }

    #[tokio::test]
    async fn test_run_checked_reports_exit_code() {
        let runner = SystemRunner::new(Duration::from_secs(10));
        let err = runner.run_checked(&Cmd::shell("exit 3")).await.unwrap_err();
        assert!(err.to_string().contains("exit code 3"));
    }

    #[tokio::test]
    async fn test_system_runner_timeout() {
        let runner = SystemRunner::new(Duration::from_millis(100));
        let result = runner.run(&Cmd::new("sleep").arg("5")).await;
        assert!(matches!(result, Err(SetupError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_recording_runner_scripted_sequence() {
        let runner = RecordingRunner::new();
        runner.respond(
            "id -u",
            vec![CommandOutput::failed(1, "no such user"), CommandOutput::ok("1000")],
        );

        let first = runner.run(&Cmd::new("id").args(["-u", "dev"])).await.unwrap();
        let second = runner.run(&Cmd::new("id").args(["-u", "dev"])).await.unwrap();
        let third = runner.run(&Cmd::new("id").args(["-u", "dev"])).await.unwrap();
        let other = runner.run(&Cmd::new("true")).await.unwrap();

        assert!(!first.success());
        assert_eq!(second.stdout, "1000");
        assert_eq!(third.stdout, "1000");
        assert!(other.success());
        assert_eq!(runner.count_matching("id -u dev"), 3);
        assert!(runner.is_dry_run());
    }
}
