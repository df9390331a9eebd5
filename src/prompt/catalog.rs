//! Prompt catalog - one template per decision point
//!
//! Templates are resolved once when the catalog is built: the built-in set
//! first, then any overrides from a YAML file keyed by [`PromptKind`] name.
//! Every rendered prompt starts with a `[kind]` tag line so transcripts (and
//! the scripted generator) can tell prompts apart.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use log::debug;
use serde::Serialize;

use super::render::PromptRenderer;
use crate::error::{DeusError, Result};

/// Every prompt the pipeline sends to the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PromptKind {
    RetrieveGoal,
    ValidateGoal,
    AskUser,
    RetrieveRequirements,
    ValidateRequirements,
    MergeRequirements,
    ValidateMerge,
    ValidateScope,
    DescribeScope,
    ValidateDescription,
    CreatePlan,
    ValidateCreatePlan,
    UpdatePlan,
    ValidateUpdatePlan,
    ToolSelection,
    ValidateToolSelection,
    TurnToAction,
    ValidateAction,
}

impl PromptKind {
    pub fn all() -> &'static [PromptKind] {
        use PromptKind::*;
        &[
            RetrieveGoal,
            ValidateGoal,
            AskUser,
            RetrieveRequirements,
            ValidateRequirements,
            MergeRequirements,
            ValidateMerge,
            ValidateScope,
            DescribeScope,
            ValidateDescription,
            CreatePlan,
            ValidateCreatePlan,
            UpdatePlan,
            ValidateUpdatePlan,
            ToolSelection,
            ValidateToolSelection,
            TurnToAction,
            ValidateAction,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::RetrieveGoal => "retrieve_goal",
            PromptKind::ValidateGoal => "validate_goal",
            PromptKind::AskUser => "ask_user",
            PromptKind::RetrieveRequirements => "retrieve_requirements",
            PromptKind::ValidateRequirements => "validate_requirements",
            PromptKind::MergeRequirements => "merge_requirements",
            PromptKind::ValidateMerge => "validate_merge",
            PromptKind::ValidateScope => "validate_scope",
            PromptKind::DescribeScope => "describe_scope",
            PromptKind::ValidateDescription => "validate_description",
            PromptKind::CreatePlan => "create_plan",
            PromptKind::ValidateCreatePlan => "validate_create_plan",
            PromptKind::UpdatePlan => "update_plan",
            PromptKind::ValidateUpdatePlan => "validate_update_plan",
            PromptKind::ToolSelection => "tool_selection",
            PromptKind::ValidateToolSelection => "validate_tool_selection",
            PromptKind::TurnToAction => "turn_to_action",
            PromptKind::ValidateAction => "validate_action",
        }
    }

    pub fn parse(name: &str) -> Option<PromptKind> {
        Self::all().iter().copied().find(|k| k.as_str() == name)
    }

    /// First line of every prompt of this kind.
    pub fn tag(&self) -> String {
        format!("[{}]", self.as_str())
    }

    /// Recover the kind from a rendered prompt's tag line.
    pub fn from_tagged(prompt: &str) -> Option<PromptKind> {
        let first = prompt.lines().next()?.trim();
        let name = first.strip_prefix('[')?.strip_suffix(']')?;
        Self::parse(name)
    }

    fn builtin_template(&self) -> &'static str {
        match self {
            PromptKind::RetrieveGoal => RETRIEVE_GOAL,
            PromptKind::ValidateGoal => VALIDATE_GOAL,
            PromptKind::AskUser => ASK_USER,
            PromptKind::RetrieveRequirements => RETRIEVE_REQUIREMENTS,
            PromptKind::ValidateRequirements => VALIDATE_REQUIREMENTS,
            PromptKind::MergeRequirements => MERGE_REQUIREMENTS,
            PromptKind::ValidateMerge => VALIDATE_MERGE,
            PromptKind::ValidateScope => VALIDATE_SCOPE,
            PromptKind::DescribeScope => DESCRIBE_SCOPE,
            PromptKind::ValidateDescription => VALIDATE_DESCRIPTION,
            PromptKind::CreatePlan => CREATE_PLAN,
            PromptKind::ValidateCreatePlan => VALIDATE_CREATE_PLAN,
            PromptKind::UpdatePlan => UPDATE_PLAN,
            PromptKind::ValidateUpdatePlan => VALIDATE_UPDATE_PLAN,
            PromptKind::ToolSelection => TOOL_SELECTION,
            PromptKind::ValidateToolSelection => VALIDATE_TOOL_SELECTION,
            PromptKind::TurnToAction => TURN_TO_ACTION,
            PromptKind::ValidateAction => VALIDATE_ACTION,
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved templates for one session.
pub struct PromptCatalog {
    renderer: PromptRenderer,
    sources: BTreeMap<PromptKind, String>,
}

impl PromptCatalog {
    /// Catalog holding only the built-in templates.
    pub fn builtin() -> Result<Self> {
        Self::with_overrides(&BTreeMap::new())
    }

    /// Built-in templates with the given ones replacing them by kind name.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self> {
        for name in overrides.keys() {
            if PromptKind::parse(name).is_none() {
                return Err(DeusError::Template(format!("Unknown prompt kind '{}'", name)));
            }
        }

        let mut renderer = PromptRenderer::new();
        let mut sources = BTreeMap::new();
        for kind in PromptKind::all() {
            let template = match overrides.get(kind.as_str()) {
                Some(custom) => {
                    debug!("Prompt {} overridden", kind);
                    custom.as_str()
                }
                None => kind.builtin_template(),
            };
            renderer.register_template(kind.as_str(), template)?;
            sources.insert(*kind, template.to_string());
        }
        Ok(Self { renderer, sources })
    }

    /// Unrendered template text for `kind`.
    pub fn template(&self, kind: PromptKind) -> &str {
        self.sources.get(&kind).map(String::as_str).unwrap_or_default()
    }

    /// Load overrides from a YAML mapping of kind name to template.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let overrides: BTreeMap<String, String> = serde_yaml::from_str(&content)
            .map_err(|e| DeusError::Template(format!("Failed to parse prompt file {}: {}", path.display(), e)))?;
        Self::with_overrides(&overrides)
    }

    /// Render the prompt for `kind`, tag line first.
    pub fn render<T: Serialize>(&self, kind: PromptKind, vars: &T) -> Result<String> {
        let body = self.renderer.render_named(kind.as_str(), vars)?;
        Ok(format!("{}\n{}", kind.tag(), body))
    }
}

macro_rules! verdict_format {
    () => {
        r#"Answer with JSON only:
{"feedback": {"success": true|false, "message": "<why>"}, "validation_instructions": "<how to fix it, empty when accepted>"}"#
    };
}

const RETRIEVE_GOAL: &str = r#"Extract the user's goal from their request as one sentence.
Request: {{user_query}}
{{#if validation_instructions}}Correction from the last attempt: {{validation_instructions}}
{{/if}}Answer with JSON only: {"user_goal": "<goal>"}"#;

const VALIDATE_GOAL: &str = concat!(
    r#"Does this goal faithfully capture the request?
Request: {{user_query}}
Goal: {{user_goal}}
"#,
    verdict_format!()
);

const ASK_USER: &str = r#"We are gathering requirements for: {{user_goal}}
Known requirements:
{{#each requirements}}- {{this}}
{{/each}}{{#if qa_history}}Earlier questions and answers:
{{#each qa_history}}Q: {{this.questions}}
A: {{this.answer}}
{{/each}}{{/if}}{{#if validation_instructions}}Still missing: {{validation_instructions}}
{{/if}}Ask the user the questions needed to complete the requirements.
Answer with JSON only: {"questions": ["<question>", ...]}"#;

const RETRIEVE_REQUIREMENTS: &str = r#"Goal: {{user_goal}}
Questions asked: {{questions}}
User answer: {{answer}}
{{#if validation_instructions}}Correction from the last attempt: {{validation_instructions}}
{{/if}}List every requirement stated in the answer, nothing more.
Answer with JSON only: {"requirements": ["<requirement>", ...]}"#;

const VALIDATE_REQUIREMENTS: &str = concat!(
    r#"Questions asked: {{questions}}
User answer: {{answer}}
Extracted requirements:
{{#each requirements}}- {{this}}
{{/each}}Are these exactly the requirements the answer states?
"#,
    verdict_format!()
);

const MERGE_REQUIREMENTS: &str = r#"Merge two requirement lists without adding or dropping information.
Existing:
{{#each existing}}- {{this}}
{{/each}}New:
{{#each delta}}- {{this}}
{{/each}}{{#if validation_instructions}}Correction from the last attempt: {{validation_instructions}}
{{/if}}Answer with JSON only: {"requirements": ["<requirement>", ...]}"#;

const VALIDATE_MERGE: &str = concat!(
    r#"Existing:
{{#each existing}}- {{this}}
{{/each}}New:
{{#each delta}}- {{this}}
{{/each}}Merged:
{{#each merged}}- {{this}}
{{/each}}Does the merged list keep every item from both lists and add nothing?
"#,
    verdict_format!()
);

const VALIDATE_SCOPE: &str = concat!(
    r#"Goal: {{user_goal}}
Requirements:
{{#each requirements}}- {{this}}
{{/each}}{{#if qa_history}}Conversation so far:
{{#each qa_history}}Q: {{this.questions}}
A: {{this.answer}}
{{/each}}{{/if}}Are the requirements complete enough to plan the work?
"#,
    r#"Answer with JSON only:
{"feedback": {"success": true|false, "message": "<why>"}, "validation_instructions": "<what is still missing>"}"#
);

const DESCRIBE_SCOPE: &str = r#"Describe this task in one paragraph, keeping every detail.
Goal: {{user_goal}}
Requirements:
{{#each requirements}}- {{this}}
{{/each}}{{#if validation_instructions}}Correction from the last attempt: {{validation_instructions}}
{{/if}}Answer with JSON only: {"description": "<description>"}"#;

const VALIDATE_DESCRIPTION: &str = concat!(
    r#"Goal: {{user_goal}}
Requirements:
{{#each requirements}}- {{this}}
{{/each}}Description: {{description}}
Does the description restate the goal and every requirement, adding nothing?
"#,
    verdict_format!()
);

const CREATE_PLAN: &str = r#"Break this task into ordered steps, each doable with one tool.
Task: {{description}}
{{#if validation_instructions}}Correction from the last attempt: {{validation_instructions}}
{{/if}}Answer with JSON only: {"plan": {"step_1": "<goal>", "step_2": {"goal": "<goal>", "blocked_by": ["step_1"]}}}"#;

const VALIDATE_CREATE_PLAN: &str = concat!(
    r#"Task: {{description}}
Plan:
{{plan}}
Will these steps, in order, accomplish the task?
"#,
    verdict_format!()
);

const UPDATE_PLAN: &str = r#"Task: {{description}}
Current plan:
{{plan}}
Result of the last step: {{last_feedback}}
{{#if validation_instructions}}Correction from the last attempt: {{validation_instructions}}
{{/if}}Revise the plan. Keep every existing step name; completed steps must stay.
Answer with JSON only: {"plan": {"<step name>": "<goal>", ...}}"#;

const VALIDATE_UPDATE_PLAN: &str = concat!(
    r#"Task: {{description}}
Previous plan:
{{previous_plan}}
Result of the last step: {{last_feedback}}
Revised plan:
{{plan}}
Does the revision keep the previous structure and address the result?
"#,
    verdict_format!()
);

const TOOL_SELECTION: &str = r#"Step: {{step_goal}}
Candidate tools:
{{#each tools}}- {{this.name}}: {{this.description}} (input: {{this.input_format}})
{{/each}}{{#if validation_instructions}}Correction from the last attempt: {{validation_instructions}}
{{/if}}Pick exactly one tool. If none fits, set "tool" to null and explain; if the step needs several tools, say "combination" in the message.
Answer with JSON only: {"tool": "<name>"|null, "feedback": {"success": true|false, "message": "<why>"}}"#;

const VALIDATE_TOOL_SELECTION: &str = concat!(
    r#"Step: {{step_goal}}
Chosen tool: {{tool_name}}: {{tool_description}}
Can this tool alone accomplish the step?
"#,
    verdict_format!()
);

const TURN_TO_ACTION: &str = r#"Step: {{step_goal}}
Tool: {{tool_name}}: {{tool_description}}
Input format: {{tool_input_format}}
{{#if validation_instructions}}Correction from the last attempt: {{validation_instructions}}
{{/if}}Write the tool input that accomplishes the step.
Answer with JSON only: {"action": {"tool_input": "<input>"}, "feedback": {"success": true|false, "message": "<why>"}}"#;

const VALIDATE_ACTION: &str = concat!(
    r#"Step: {{step_goal}}
Tool: {{tool_name}} (input: {{tool_input_format}})
Proposed input: {{tool_input}}
Is this input well formed and will it accomplish the step?
"#,
    verdict_format!()
);
