//! Tool - a read-only catalog entry the pipeline can bind a step to

use serde::{Deserialize, Serialize};

/// A tool as the catalog describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub name: String,
    pub description: String,
    /// What the tool expects as its input string
    #[serde(default)]
    pub input_format: String,
    /// Shell command the executor runs for this tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_format: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            description: description.into(),
            input_format: input_format.into(),
            command: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}
