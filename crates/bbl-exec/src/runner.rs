use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ExecError;

/// One subprocess invocation: binary, args, working dir, extra environment.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub binary: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl RunRequest {
    pub fn new(binary: impl Into<String>, args: &[&str]) -> Self {
        Self {
            binary: binary.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: HashMap::new(),
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &HashMap<String, String>) -> Self {
        self.env.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Result of a finished subprocess: exit code plus combined stdout+stderr.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: i32,
    pub log: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The single subprocess capability of this workspace. The infrastructure
/// engine and the BOSH installer are both driven through it; nothing else
/// spawns processes.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, req: RunRequest) -> Result<RunOutput, ExecError>;
}

/// Production [`CommandRunner`] backed by [`tokio::process::Command`].
///
/// Combined stdout+stderr is captured line by line and mirrored to tracing
/// under the `bbl::exec` target, so long-running engine output is visible
/// while it streams. The child inherits the process group, so a SIGINT to
/// bbl reaches the child as well.
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new() -> Self {
        // Infrastructure applies and BOSH create-env runs can legitimately
        // take tens of minutes; anything past this is treated as hung.
        Self {
            timeout: Duration::from_secs(3600),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, req: RunRequest) -> Result<RunOutput, ExecError> {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            binary = %req.binary,
            args = ?req.args,
            "running external command"
        );

        let mut cmd = Command::new(&req.binary);
        cmd.args(&req.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .envs(&req.env);
        if let Some(dir) = &req.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
            binary: req.binary.clone(),
            source: e,
        })?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        // Merge stdout and stderr by reading them concurrently into a shared
        // log buffer. Each line is also mirrored to tracing.
        let mut log = String::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

        let tx1 = tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx1.send(line);
            }
        });

        let tx2 = tx.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx2.send(line);
            }
        });

        drop(tx); // close our own sender so rx finishes when both tasks finish

        let collect = async {
            while let Some(line) = rx.recv().await {
                debug!(target: "bbl::exec", "{}", line);
                log.push_str(&line);
                log.push('\n');
            }
        };
        let timed_out = tokio::time::timeout(self.timeout, collect).await.is_err();

        stdout_task.await.ok();
        stderr_task.await.ok();

        if timed_out {
            let _ = child.kill().await;
            return Err(ExecError::TimedOut {
                binary: req.binary.clone(),
                subcommand: req.args.first().cloned().unwrap_or_default(),
                minutes: self.timeout.as_secs() / 60,
            });
        }

        let status = child.wait().await.map_err(|e| ExecError::Wait {
            binary: req.binary.clone(),
            source: e,
        })?;

        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 {
            warn!(%run_id, binary = %req.binary, exit_code, "external command exited non-zero");
        }
        Ok(RunOutput { exit_code, log })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let runner = SystemRunner::new();
        let out = runner
            .run(RunRequest::new("sh", &["-c", "echo hello"]))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.log.trim(), "hello");
    }

    #[tokio::test]
    async fn captures_stderr_and_nonzero_exit() {
        let runner = SystemRunner::new();
        let out = runner
            .run(RunRequest::new("sh", &["-c", "echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(out.log.contains("oops"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let runner = SystemRunner::new();
        let err = runner
            .run(RunRequest::new("definitely-not-a-binary-bbl", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let runner = SystemRunner::with_timeout(Duration::from_millis(200));
        let err = runner
            .run(RunRequest::new("sh", &["-c", "sleep 5"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }));
    }
}
