//! Action - a concrete, tool-bound attempt at a step

use serde::{Deserialize, Serialize};

use super::tool::Tool;
use crate::feedback::Feedback;
use crate::id::generate_action_id;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub step_id: String,
    pub tool: Tool,
    pub tool_input: String,
    pub output: Option<String>,
    pub feedback: Option<Feedback>,
}

impl Action {
    pub fn new(step_id: impl Into<String>, tool: Tool, tool_input: impl Into<String>) -> Self {
        let step_id = step_id.into();
        Self {
            id: generate_action_id(&step_id),
            step_id,
            tool,
            tool_input: tool_input.into(),
            output: None,
            feedback: None,
        }
    }

    /// Attach what the executor returned.
    pub fn record_execution(&mut self, output: impl Into<String>, feedback: Feedback) {
        self.output = Some(output.into());
        self.feedback = Some(feedback);
    }

    pub fn succeeded(&self) -> bool {
        self.feedback.as_ref().is_some_and(Feedback::is_success)
    }
}
