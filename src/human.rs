//! Human boundary - clarifying questions during scope gathering
//!
//! Answering `stop` (any case, surrounding whitespace ignored) aborts scope
//! gathering.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::error::{DeusError, Result};
use crate::generator::bounded;

/// Reserved answer that ends scope gathering
pub const STOP_SENTINEL: &str = "stop";

pub fn is_stop(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case(STOP_SENTINEL)
}

/// Someone who answers clarifying questions.
#[async_trait]
pub trait Human: Send + Sync {
    async fn ask(&self, questions: &str) -> Result<String>;
}

/// Ask under a timeout and cancellation token, mapping the stop sentinel
/// to `ScopeAborted`.
pub async fn ask_bounded(
    human: &dyn Human,
    questions: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String> {
    let answer = bounded(timeout, cancel, human.ask(questions)).await?;
    if is_stop(&answer) {
        return Err(DeusError::ScopeAborted);
    }
    Ok(answer)
}

/// Prompts on stdout and reads one line from stdin
#[derive(Debug, Default)]
pub struct ConsoleHuman;

#[async_trait]
impl Human for ConsoleHuman {
    async fn ask(&self, questions: &str) -> Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("\n{}\n(type '{}' to abort)\n> ", questions, STOP_SENTINEL).as_bytes())
            .await?;
        stdout.flush().await?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        if read == 0 {
            // stdin closed
            return Ok(STOP_SENTINEL.to_string());
        }
        Ok(line.trim().to_string())
    }
}

/// Answers from a queue; answers `stop` once it runs dry
#[derive(Default)]
pub struct ScriptedHuman {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedHuman {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Every question text received so far
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Human for ScriptedHuman {
    async fn ask(&self, questions: &str) -> Result<String> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(questions.to_string());
        }
        let next = self
            .answers
            .lock()
            .map_err(|e| DeusError::InvalidState(e.to_string()))?
            .pop_front();
        Ok(next.unwrap_or_else(|| STOP_SENTINEL.to_string()))
    }
}
