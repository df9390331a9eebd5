//! Logger - append-only iteration records
//!
//! Records live in an arena in the order they were opened and are addressed
//! by index. Each iteration starts from a snapshot of the context at the time
//! it was opened; when the context has not changed since the previous
//! snapshot, the two records share it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use super::entry::{LogEntry, LogKind};
use crate::domain::Context;
use crate::error::Result;
use crate::feedback::Feedback;

/// One pass of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationLog {
    pub index: usize,
    pub opened_at: DateTime<Utc>,
    pub snapshot: Arc<Context>,
    pub logs: Vec<LogEntry>,
    /// Verdict of the task-handling pass that closed this iteration
    pub outcome: Option<Feedback>,
}

/// A clarifying round as the completeness validator sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionAnswer {
    pub questions: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Logger {
    records: Vec<IterationLog>,
}

impl Logger {
    /// Start a logger whose first record snapshots `context`.
    pub fn new(context: &Context) -> Self {
        Self {
            records: vec![IterationLog {
                index: 0,
                opened_at: Utc::now(),
                snapshot: Arc::new(context.clone()),
                logs: Vec::new(),
                outcome: None,
            }],
        }
    }

    /// Open a new record for the next iteration and return its index.
    pub fn add_iteration(&mut self, context: &Context) -> usize {
        let head = self.head();
        let snapshot = if *head.snapshot == *context {
            Arc::clone(&head.snapshot)
        } else {
            Arc::new(context.clone())
        };
        let index = self.records.len();
        self.records.push(IterationLog {
            index,
            opened_at: Utc::now(),
            snapshot,
            logs: Vec::new(),
            outcome: None,
        });
        debug!("Opened iteration {}", index);
        index
    }

    /// Append to the newest record.
    pub fn log(&mut self, entry: LogEntry) {
        debug!("log: {}", entry.kind.name());
        self.head_mut().logs.push(entry);
    }

    pub fn set_outcome(&mut self, feedback: Feedback) {
        self.head_mut().outcome = Some(feedback);
    }

    pub fn head(&self) -> &IterationLog {
        // never empty: `new` opens the first record
        &self.records[self.records.len() - 1]
    }

    fn head_mut(&mut self) -> &mut IterationLog {
        let last = self.records.len() - 1;
        &mut self.records[last]
    }

    pub fn get(&self, index: usize) -> Option<&IterationLog> {
        self.records.get(index)
    }

    /// Records newest first.
    pub fn iterations(&self) -> impl Iterator<Item = &IterationLog> {
        self.records.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every entry across all records, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.records.iter().flat_map(|r| r.logs.iter())
    }

    /// Clarifying rounds so far, oldest first.
    pub fn questions_answers(&self) -> Vec<QuestionAnswer> {
        self.entries()
            .filter_map(|e| match &e.kind {
                LogKind::Refinement { questions, answer, .. } => Some(QuestionAnswer {
                    questions: questions.join("\n"),
                    answer: answer.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Write one JSON line per record, oldest first.
    pub fn write_jsonl(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        for record in &self.records {
            serde_json::to_writer(&mut writer, record)?;
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}
