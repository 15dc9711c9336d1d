//! Stage execution
//!
//! Runs one external tool invocation with a deadline and captures its
//! stdout. A timeout or a non-zero exit keeps whatever output was produced
//! before the tool stopped.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// A fully-substituted tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Lines piped to the tool's stdin, if any
    pub stdin: Option<String>,
    pub timeout: Duration,
}

/// How an invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed { output: String },
    Failed { code: Option<i32>, output: String },
    TimedOut { output: String },
    SpawnFailed { reason: String },
}

impl StageOutcome {
    /// Stdout captured so far, possibly partial
    pub fn output(&self) -> &str {
        match self {
            StageOutcome::Completed { output }
            | StageOutcome::Failed { output, .. }
            | StageOutcome::TimedOut { output } => output,
            StageOutcome::SpawnFailed { .. } => "",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Completed { .. })
    }
}

/// Executes tool invocations
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> StageOutcome;
}

/// Runs tools as child processes
///
/// The tool's stderr is inherited so it lands in the unit's log file.
pub struct CommandRunner;

#[async_trait]
impl ToolRunner for CommandRunner {
    async fn run(&self, invocation: &Invocation) -> StageOutcome {
        debug!(
            "Running {} {}",
            invocation.program,
            invocation.args.join(" ")
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return StageOutcome::SpawnFailed {
                    reason: e.to_string(),
                };
            }
        };

        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take();
        let mut captured = Vec::new();

        let finished = tokio::time::timeout(invocation.timeout, async {
            let feed = async {
                if let (Some(mut pipe), Some(data)) = (stdin, invocation.stdin.as_deref()) {
                    // A tool may exit without draining its input
                    let _ = pipe.write_all(data.as_bytes()).await;
                    let _ = pipe.shutdown().await;
                }
            };
            let drain = async {
                if let Some(out) = stdout.as_mut() {
                    let _ = out.read_to_end(&mut captured).await;
                }
            };
            tokio::join!(feed, drain);
            child.wait().await
        })
        .await;

        match finished {
            Ok(Ok(status)) => {
                let output = String::from_utf8_lossy(&captured).into_owned();
                if status.success() {
                    StageOutcome::Completed { output }
                } else {
                    StageOutcome::Failed {
                        code: status.code(),
                        output,
                    }
                }
            }
            Ok(Err(e)) => StageOutcome::SpawnFailed {
                reason: e.to_string(),
            },
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                StageOutcome::TimedOut {
                    output: String::from_utf8_lossy(&captured).into_owned(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, stdin: Option<&str>, timeout: Duration) -> Invocation {
        Invocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            stdin: stdin.map(str::to_string),
            timeout,
        }
    }

    #[tokio::test]
    async fn test_completed_output() {
        let outcome = CommandRunner
            .run(&sh("echo a; echo b", None, Duration::from_secs(10)))
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.output(), "a\nb\n");
    }

    #[tokio::test]
    async fn test_stdin_is_piped() {
        let outcome = CommandRunner
            .run(&sh("cat", Some("x\ny\n"), Duration::from_secs(10)))
            .await;
        assert_eq!(outcome.output(), "x\ny\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_output() {
        let outcome = CommandRunner
            .run(&sh("echo partial; exit 3", None, Duration::from_secs(10)))
            .await;
        assert_eq!(
            outcome,
            StageOutcome::Failed {
                code: Some(3),
                output: "partial\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let outcome = CommandRunner
            .run(&sh("echo early; sleep 5", None, Duration::from_millis(500)))
            .await;
        assert_eq!(
            outcome,
            StageOutcome::TimedOut {
                output: "early\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let invocation = Invocation {
            program: "/nonexistent/argus-tool".to_string(),
            args: vec![],
            stdin: None,
            timeout: Duration::from_secs(1),
        };
        let outcome = CommandRunner.run(&invocation).await;
        assert!(matches!(outcome, StageOutcome::SpawnFailed { .. }));
        assert_eq!(outcome.output(), "");
    }
}
