//! Subprocess driver for the external code-generation agent.
//!
//! Launches the agent CLI, delivers the prompt on stdin, forwards stdout
//! line-by-line, and enforces the timeout and cancellation sequences.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{AgentExit, AgentRequest};
use crate::domain::ports::AgentInvoker;

/// Grace period between the terminate signal and a forced kill.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Drives the agent CLI as a child process.
pub struct AgentCliDriver {
    binary: String,
    grace: Duration,
}

impl AgentCliDriver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            grace: KILL_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn build_args(request: &AgentRequest) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--model".to_string(),
            request.model.clone(),
            "--max-turns".to_string(),
            request.max_turns.to_string(),
            "--output-format".to_string(),
            request.output_format.as_flag().to_string(),
        ];
        if !request.allowed_tools.is_empty() {
            args.push("--allowed-tools".to_string());
            args.push(request.allowed_tools.join(","));
        }
        if let Some(path) = &request.mcp_config_path {
            args.push("--mcp-config".to_string());
            args.push(path.display().to_string());
        }
        args
    }

    /// Terminate then, after the grace period, kill the child.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(error = %e, "failed to signal agent process");
            }
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("agent ignored terminate signal; killing");
                let _ = child.kill().await;
            }
        }
    }
}

#[async_trait]
impl AgentInvoker for AgentCliDriver {
    async fn invoke(
        &self,
        request: AgentRequest,
        lines: mpsc::Sender<String>,
        mut shutdown: watch::Receiver<bool>,
    ) -> BuildResult<AgentExit> {
        let args = Self::build_args(&request);
        debug!(binary = %self.binary, ?args, "launching agent");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(&request.working_dir)
            .env("CLAUDE_CODE_BUILDER", env!("CARGO_PKG_VERSION"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Deliver the prompt and close stdin.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request.prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BuildError::AgentFailed {
                exit_code: -1,
                stderr: "failed to capture agent stderr".to_string(),
            })?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let mut reader = BufReader::new(stderr);
            let _ = reader.read_to_string(&mut buf).await;
            buf
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BuildError::AgentFailed {
                exit_code: -1,
                stderr: "failed to capture agent stdout".to_string(),
            })?;
        let mut reader = BufReader::new(stdout).lines();

        let deadline = tokio::time::sleep(request.timeout);
        tokio::pin!(deadline);

        if *shutdown.borrow() {
            self.terminate(&mut child).await;
            return Ok(AgentExit::Cancelled);
        }

        loop {
            tokio::select! {
                line = reader.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if lines.send(line).await.is_err() {
                                // Classifier is gone; keep draining quietly.
                                debug!("event consumer dropped; draining stdout");
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "agent stdout read failed");
                            break;
                        }
                    }
                }
                () = &mut deadline => {
                    warn!(timeout_secs = request.timeout.as_secs(), "phase timeout; terminating agent");
                    self.terminate(&mut child).await;
                    return Ok(AgentExit::TimedOut);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.terminate(&mut child).await;
                        return Ok(AgentExit::Cancelled);
                    }
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        let exit_code = status.code().unwrap_or(-1);
        debug!(exit_code, "agent exited");

        Ok(AgentExit::Completed { exit_code, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::OutputFormat;
    use std::path::PathBuf;

    fn request() -> AgentRequest {
        AgentRequest {
            prompt: "build it".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_turns: 30,
            allowed_tools: vec!["Read".to_string(), "Write".to_string()],
            mcp_config_path: Some(PathBuf::from("/tmp/proj/.mcp.json")),
            output_format: OutputFormat::StreamJson,
            working_dir: PathBuf::from("/tmp/proj"),
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_build_args() {
        let args = AgentCliDriver::build_args(&request());
        assert!(args.contains(&"--model".to_string()));
        assert!(args.contains(&"claude-sonnet-4-5".to_string()));
        assert!(args.contains(&"--max-turns".to_string()));
        assert!(args.contains(&"30".to_string()));
        assert!(args.contains(&"--output-format".to_string()));
        assert!(args.contains(&"stream-json".to_string()));
        assert!(args.contains(&"Read,Write".to_string()));
        assert!(args.contains(&"--mcp-config".to_string()));
    }

    #[test]
    fn test_build_args_omits_empty_tool_list() {
        let mut req = request();
        req.allowed_tools.clear();
        req.mcp_config_path = None;
        let args = AgentCliDriver::build_args(&req);
        assert!(!args.contains(&"--allowed-tools".to_string()));
        assert!(!args.contains(&"--mcp-config".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_reports_nonzero_exit_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        // sh rejects the agent flags and exits non-zero with a message.
        let driver = AgentCliDriver::new("sh");
        let req = AgentRequest {
            prompt: String::new(),
            model: "sonnet".to_string(),
            max_turns: 1,
            allowed_tools: vec![],
            mcp_config_path: None,
            output_format: OutputFormat::StreamJson,
            working_dir: dir.path().to_path_buf(),
            timeout: Duration::from_secs(10),
        };
        let (tx, mut rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let exit = driver.invoke(req, tx, shutdown_rx).await.unwrap();
        drain.await.unwrap();
        match exit {
            AgentExit::Completed { exit_code, stderr } => {
                assert_ne!(exit_code, 0);
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected exit: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        // `yes` streams forever, so only the timeout path can end it.
        let driver = AgentCliDriver::new("yes").with_grace(Duration::from_millis(200));
        let req = AgentRequest {
            prompt: String::new(),
            model: "sonnet".to_string(),
            max_turns: 1,
            allowed_tools: vec![],
            mcp_config_path: None,
            output_format: OutputFormat::StreamJson,
            working_dir: dir.path().to_path_buf(),
            timeout: Duration::from_millis(300),
        };
        let (tx, mut rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let exit = driver.invoke(req, tx, shutdown_rx).await.unwrap();
        assert_eq!(exit, AgentExit::TimedOut);
        drain.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let driver = AgentCliDriver::new("yes").with_grace(Duration::from_millis(200));
        let req = AgentRequest {
            prompt: String::new(),
            model: "sonnet".to_string(),
            max_turns: 1,
            allowed_tools: vec![],
            mcp_config_path: None,
            output_format: OutputFormat::StreamJson,
            working_dir: dir.path().to_path_buf(),
            timeout: Duration::from_secs(30),
        };
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let invoke = tokio::spawn(async move { driver.invoke(req, tx, shutdown_rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();

        let exit = invoke.await.unwrap().unwrap();
        assert_eq!(exit, AgentExit::Cancelled);
        drain.await.unwrap();
    }
}
