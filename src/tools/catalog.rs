//! Tool catalog - resolve a step to candidate tools
//!
//! [`StaticToolCatalog`] loads tool definitions from YAML and ranks them by
//! keyword overlap with the step's name and goal.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use crate::domain::{Step, Tool};
use crate::error::{DeusError, Result};

/// Finds the tools that might accomplish a step.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn find_candidate_tools(&self, step: &Step) -> Result<Vec<Tool>>;
}

/// YAML representation of a tool definition
#[derive(Debug, Deserialize)]
struct YamlTool {
    id: Option<String>,
    name: String,
    description: String,
    #[serde(default)]
    input_format: String,
    command: Option<String>,
}

/// YAML file structure
#[derive(Debug, Deserialize)]
struct YamlCatalog {
    #[serde(default)]
    tools: Vec<YamlTool>,
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "use", "using", "each", "all", "any",
];

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Fixed tool list ranked by keyword overlap
#[derive(Debug, Clone)]
pub struct StaticToolCatalog {
    tools: Vec<Tool>,
    limit: usize,
}

impl StaticToolCatalog {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self { tools, limit: 5 }
    }

    /// Cap the number of candidates returned per step
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Load catalog from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeusError::Tool(format!("Failed to read catalog file {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Load catalog from YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let catalog: YamlCatalog =
            serde_yaml::from_str(content).map_err(|e| DeusError::Tool(format!("Failed to parse catalog: {}", e)))?;

        let mut seen = HashSet::new();
        let mut tools = Vec::with_capacity(catalog.tools.len());
        for raw in catalog.tools {
            let id = raw.id.unwrap_or_else(|| raw.name.clone());
            if !seen.insert(id.clone()) {
                return Err(DeusError::Tool(format!("Duplicate tool id '{}'", id)));
            }
            tools.push(Tool {
                id,
                name: raw.name,
                description: raw.description,
                input_format: raw.input_format,
                command: raw.command,
            });
        }
        Ok(Self::new(tools))
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tools sharing at least one keyword with the step, best match first.
    /// Ties keep catalog order.
    pub fn rank(&self, step: &Step) -> Vec<Tool> {
        let wanted = keywords(&format!("{} {}", step.name, step.goal));
        let mut scored: Vec<(usize, usize, &Tool)> = self
            .tools
            .iter()
            .enumerate()
            .map(|(i, tool)| {
                let offered = keywords(&format!("{} {}", tool.name, tool.description));
                (wanted.intersection(&offered).count(), i, tool)
            })
            .filter(|(score, _, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(self.limit).map(|(_, _, t)| t.clone()).collect()
    }
}

#[async_trait]
impl ToolCatalog for StaticToolCatalog {
    async fn find_candidate_tools(&self, step: &Step) -> Result<Vec<Tool>> {
        let found = self.rank(step);
        debug!("{} candidate tools for step {}", found.len(), step.name);
        Ok(found)
    }
}
