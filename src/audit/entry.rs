//! Log entries - one immutable record per observable event
//!
//! Each entry carries a timestamp, the feedback that resulted (when there is
//! one) and a [`LogKind`] payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Action, Plan, Tool};
use crate::feedback::Feedback;

/// What happened, with the payload for that kind of event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogKind {
    /// Producer call: raw generator output and the value parsed from it
    Retrieval {
        field: String,
        prompt: String,
        response: String,
        data: Option<serde_json::Value>,
    },
    /// Validator call and the guidance it returned
    Validation {
        field: String,
        prompt: String,
        response: String,
        validation_instructions: String,
    },
    /// One clarifying round with the human
    Refinement {
        questions: Vec<String>,
        answer: String,
        requirements: Vec<String>,
    },
    GoalUpdate {
        previous_goal: Option<String>,
        goal: String,
    },
    PlanUpdate {
        previous_plan: Option<Plan>,
        plan: Option<Plan>,
    },
    CandidateTools {
        step_id: String,
        tools: Vec<Tool>,
    },
    ToolSelection {
        step_id: String,
        tool: Option<Tool>,
    },
    /// A step and tool turned into a concrete action
    Action {
        step_id: String,
        action: Option<Action>,
    },
    Execution {
        action_id: String,
        tool_input: String,
        output: String,
    },
}

impl LogKind {
    pub fn name(&self) -> &'static str {
        match self {
            LogKind::Retrieval { .. } => "retrieval",
            LogKind::Validation { .. } => "validation",
            LogKind::Refinement { .. } => "refinement",
            LogKind::GoalUpdate { .. } => "goal_update",
            LogKind::PlanUpdate { .. } => "plan_update",
            LogKind::CandidateTools { .. } => "candidate_tools",
            LogKind::ToolSelection { .. } => "tool_selection",
            LogKind::Action { .. } => "action",
            LogKind::Execution { .. } => "execution",
        }
    }

    /// Field name for retrieval and validation entries.
    pub fn field(&self) -> Option<&str> {
        match self {
            LogKind::Retrieval { field, .. } | LogKind::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    #[serde(flatten)]
    pub kind: LogKind,
}

impl LogEntry {
    pub fn new(kind: LogKind) -> Self {
        Self {
            timestamp: Utc::now(),
            feedback: None,
            kind,
        }
    }

    pub fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn retrieval(
        field: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::new(LogKind::Retrieval {
            field: field.into(),
            prompt: prompt.into(),
            response: response.into(),
            data,
        })
    }

    pub fn validation(
        field: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
        validation_instructions: impl Into<String>,
    ) -> Self {
        Self::new(LogKind::Validation {
            field: field.into(),
            prompt: prompt.into(),
            response: response.into(),
            validation_instructions: validation_instructions.into(),
        })
    }

    pub fn is_retrieval_of(&self, field: &str) -> bool {
        matches!(&self.kind, LogKind::Retrieval { field: f, .. } if f == field)
    }

    pub fn is_validation_of(&self, field: &str) -> bool {
        matches!(&self.kind, LogKind::Validation { field: f, .. } if f == field)
    }
}
