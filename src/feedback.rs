//! Success/failure verdicts and their aggregation.
//!
//! Every decision point in the pipeline ends in a [`Feedback`]. A
//! [`FeedbackBundle`] folds a sequence of them into one verdict: the bundle
//! succeeds only while every member succeeded.

use serde::{Deserialize, Serialize};

use crate::error::{DeusError, Result};

/// Category of failure for domain-level verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// A validator returned success=false
    ValidationRejected,
    /// The refine loop ran out of attempts
    RetryExhausted,
    /// The plan has no unaccomplished step
    NoActiveStep,
    /// None of the candidate tools fits the step
    NoSuitableTool,
    /// The step needs more than one tool
    ToolCombinationNeeded,
    /// The tool ran but reported failure
    Execution,
    /// Generator output could not be parsed
    MalformedOutput,
    /// Generator transport failure or timeout
    Service,
    /// The session was cancelled or the user stopped it
    Aborted,
}

impl FailureCategory {
    /// Get a human-readable name for the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::ValidationRejected => "validation_rejected",
            FailureCategory::RetryExhausted => "retry_exhausted",
            FailureCategory::NoActiveStep => "no_active_step",
            FailureCategory::NoSuitableTool => "no_suitable_tool",
            FailureCategory::ToolCombinationNeeded => "tool_combination_needed",
            FailureCategory::Execution => "execution",
            FailureCategory::MalformedOutput => "malformed_output",
            FailureCategory::Service => "service",
            FailureCategory::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A terminal judgment about one attempt. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    message: String,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<FailureCategory>,
}

impl Feedback {
    pub fn new(message: impl Into<String>, success: bool) -> Self {
        Self {
            message: message.into(),
            success,
            category: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, true)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, false)
    }

    /// A failed verdict tagged with its category.
    pub fn categorized(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
            category: Some(category),
        }
    }

    /// Fold a phase error into a failed verdict.
    pub fn from_error(err: &DeusError) -> Self {
        let category = match err {
            DeusError::RetryExhausted { .. } => FailureCategory::RetryExhausted,
            DeusError::MalformedOutput { .. } => FailureCategory::MalformedOutput,
            DeusError::Service(_) | DeusError::GeneratorTimeout(_) => FailureCategory::Service,
            DeusError::Cancelled | DeusError::ScopeAborted => FailureCategory::Aborted,
            DeusError::Tool(_) => FailureCategory::Execution,
            _ => FailureCategory::Service,
        };
        Self::categorized(category, err.to_string())
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn category(&self) -> Option<FailureCategory> {
        self.category
    }
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Ordered feedback sequence with a running AND over its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackBundle {
    bundle: Vec<Feedback>,
    success: bool,
}

impl FeedbackBundle {
    pub fn new() -> Self {
        Self {
            bundle: Vec::new(),
            success: true,
        }
    }

    pub fn append(&mut self, feedback: Feedback) {
        self.success = self.success && feedback.is_success();
        self.bundle.push(feedback);
    }

    /// Most recent member. Fails on an empty bundle.
    pub fn last_feedback(&self) -> Result<&Feedback> {
        self.bundle.last().ok_or(DeusError::EmptyBundle)
    }

    /// AND over all members. Fails on an empty bundle.
    pub fn success(&self) -> Result<bool> {
        if self.bundle.is_empty() {
            return Err(DeusError::EmptyBundle);
        }
        Ok(self.success)
    }

    pub fn members(&self) -> &[Feedback] {
        &self.bundle
    }

    pub fn len(&self) -> usize {
        self.bundle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundle.is_empty()
    }
}

impl Default for FeedbackBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Feedback> for FeedbackBundle {
    fn from_iter<I: IntoIterator<Item = Feedback>>(iter: I) -> Self {
        let mut bundle = FeedbackBundle::new();
        for feedback in iter {
            bundle.append(feedback);
        }
        bundle
    }
}

impl std::fmt::Display for FeedbackBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines: Vec<&str> = self.bundle.iter().map(|fb| fb.message()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}
