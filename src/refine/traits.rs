//! Producer and validator interfaces for the refine loop

use async_trait::async_trait;

use crate::audit::LogEntry;
use crate::error::Result;
use crate::feedback::{FailureCategory, Feedback};

/// What one producer call yielded.
#[derive(Debug)]
pub struct Production<T> {
    /// Parsed value, absent when the output was unusable
    pub candidate: Option<T>,
    /// Raw record of the call, logged before anything else happens
    pub entry: LogEntry,
    /// Why `candidate` is absent
    pub problem: String,
}

impl<T> Production<T> {
    pub fn parsed(candidate: T, entry: LogEntry) -> Self {
        Self {
            candidate: Some(candidate),
            entry,
            problem: String::new(),
        }
    }

    pub fn malformed(problem: impl Into<String>, entry: LogEntry) -> Self {
        Self {
            candidate: None,
            entry,
            problem: problem.into(),
        }
    }
}

/// Generates a candidate value, taking the last validator's guidance.
#[async_trait]
pub trait Producer: Send + Sync {
    type Candidate: Send + Sync;

    /// Name of the value being produced, used in logs and errors.
    fn field(&self) -> &str;

    /// One attempt. Transport failures are errors; unparseable output is a
    /// [`Production`] without a candidate.
    async fn produce(&self, guidance: &str) -> Result<Production<Self::Candidate>>;
}

/// A validator's judgment on one candidate.
#[derive(Debug, Clone)]
pub struct Review {
    pub feedback: Feedback,
    /// Correction to feed into the next production attempt
    pub guidance: String,
    pub prompt: String,
    pub response: String,
    /// Why the reply could not be read as a verdict
    pub problem: Option<String>,
}

impl Review {
    /// A verdict reached without calling the generator.
    pub fn local(feedback: Feedback, guidance: impl Into<String>) -> Self {
        Self {
            feedback,
            guidance: guidance.into(),
            prompt: String::new(),
            response: "(local check)".to_string(),
            problem: None,
        }
    }

    /// A generator reply that carried no usable verdict. Still logged, then
    /// the loop aborts with `MalformedOutput`.
    pub fn malformed(problem: impl Into<String>, prompt: String, response: String) -> Self {
        let problem = problem.into();
        Self {
            feedback: Feedback::categorized(FailureCategory::MalformedOutput, problem.clone()),
            guidance: String::new(),
            prompt,
            response,
            problem: Some(problem),
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.problem.is_some()
    }
}

/// Judges candidates of type `T`.
#[async_trait]
pub trait Validator<T: Send + Sync>: Send + Sync {
    async fn review(&self, candidate: &T) -> Result<Review>;
}
