//! Tool execution - run an action's input against its tool
//!
//! [`CommandExecutor`] runs the tool's shell command with the input on stdin
//! and in `DEUS_TOOL_INPUT`. [`ScriptedExecutor`] replays canned results.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::domain::Tool;
use crate::error::{DeusError, Result};
use crate::feedback::{FailureCategory, Feedback};

/// Environment variable carrying the tool input
pub const TOOL_INPUT_ENV: &str = "DEUS_TOOL_INPUT";

const MAX_OUTPUT_CHARS: usize = 30_000;

/// What running a tool produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub output: String,
    pub feedback: Feedback,
}

impl Execution {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            feedback: Feedback::success("tool ran successfully"),
        }
    }

    pub fn failure(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            feedback: Feedback::categorized(FailureCategory::Execution, message),
        }
    }
}

/// Runs a tool against an input string.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool: &Tool, input: &str) -> Result<Execution>;
}

/// Executes tools as `sh -c <command>`
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn truncate(output: String) -> String {
        if output.chars().count() <= MAX_OUTPUT_CHARS {
            return output;
        }
        let kept: String = output.chars().take(MAX_OUTPUT_CHARS).collect();
        format!("{}...\n[truncated, {} chars total]", kept, output.chars().count())
    }
}

#[async_trait]
impl ToolExecutor for CommandExecutor {
    async fn execute(&self, tool: &Tool, input: &str) -> Result<Execution> {
        let command = tool
            .command
            .as_deref()
            .ok_or_else(|| DeusError::Tool(format!("Tool '{}' has no command", tool.name)))?;
        debug!("Executing tool {}: {}", tool.name, command);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env(TOOL_INPUT_ENV, input)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeusError::Tool(format!("Failed to spawn '{}': {}", tool.name, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // a command that never reads stdin closes the pipe early
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!("stdin for {} closed early: {}", tool.name, e);
            }
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("Tool {} timed out after {:?}", tool.name, self.timeout);
                return Ok(Execution::failure(
                    "",
                    format!("Tool '{}' timed out after {}ms", tool.name, self.timeout.as_millis()),
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = if stdout.is_empty() && !stderr.is_empty() {
            stderr.to_string()
        } else if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n\nSTDERR:\n{}", stdout, stderr)
        };
        let combined = Self::truncate(combined);

        if output.status.success() {
            Ok(Execution::success(combined))
        } else {
            let code = output.status.code().unwrap_or(-1);
            Ok(Execution::failure(
                combined,
                format!("Tool '{}' exited with code {}", tool.name, code),
            ))
        }
    }
}

/// Executor that replays queued results, then succeeds with empty output
#[derive(Default)]
pub struct ScriptedExecutor {
    queued: Mutex<VecDeque<Execution>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, execution: Execution) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(execution);
        }
        self
    }

    /// `(tool name, input)` for every call so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(&self, tool: &Tool, input: &str) -> Result<Execution> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((tool.name.clone(), input.to_string()));
        }
        let next = self
            .queued
            .lock()
            .map_err(|e| DeusError::Tool(e.to_string()))?
            .pop_front();
        Ok(next.unwrap_or_else(|| Execution::success("")))
    }
}
