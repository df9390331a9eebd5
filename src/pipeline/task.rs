//! Task handling: bind the current step to one tool, act, execute

use std::sync::Arc;

use log::{info, warn};
use serde_json::{Value, json};

use super::session::{Session, is_recoverable};
use crate::audit::{LogEntry, LogKind};
use crate::domain::{Action, Phase, Step, Tool};
use crate::error::{DeusError, Result};
use crate::feedback::{FailureCategory, Feedback};
use crate::generator::{bounded, parse_feedback, parse_text};
use crate::prompt::PromptKind;
use crate::refine::{PromptedProducer, PromptedValidator, Review, reject_locally};
use crate::tools::Execution;

/// What the tool selector decided.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolChoice {
    Selected(Tool),
    /// No single candidate fits
    Declined { category: FailureCategory, reason: String },
    /// A name that is not among the candidates
    Unlisted(String),
}

/// Proposed tool input, plus the producer's own verdict when it gave one.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDraft {
    pub tool_input: String,
    pub declared: Option<Feedback>,
}

fn decline_category(reason: &str) -> FailureCategory {
    if reason.to_lowercase().contains("combination") {
        FailureCategory::ToolCombinationNeeded
    } else {
        FailureCategory::NoSuitableTool
    }
}

pub(super) fn parse_tool_choice(json: &Value, candidates: &[Tool]) -> std::result::Result<ToolChoice, String> {
    let declared = parse_feedback(json);
    let reason = declared
        .as_ref()
        .map(|f| f.message().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "no suitable tool".to_string());

    match json.get("tool") {
        Some(Value::String(name)) if !name.trim().is_empty() => {
            if declared.as_ref().is_some_and(|f| !f.is_success()) {
                return Ok(ToolChoice::Declined {
                    category: decline_category(&reason),
                    reason,
                });
            }
            let name = name.trim();
            Ok(candidates
                .iter()
                .find(|t| t.name == name || t.id == name)
                .cloned()
                .map(ToolChoice::Selected)
                .unwrap_or_else(|| ToolChoice::Unlisted(name.to_string())))
        }
        Some(Value::Null) | Some(Value::String(_)) => Ok(ToolChoice::Declined {
            category: decline_category(&reason),
            reason,
        }),
        Some(_) => Err("tool must be a name or null".to_string()),
        None => Err("missing tool".to_string()),
    }
}

pub(super) fn parse_action_draft(json: &Value) -> std::result::Result<ActionDraft, String> {
    let tool_input = json
        .get("action")
        .and_then(|action| match action {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => action.get("tool_input").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .or_else(|| parse_text(json, "tool_input"))
        .ok_or_else(|| "missing action.tool_input".to_string())?;
    Ok(ActionDraft {
        tool_input,
        declared: parse_feedback(json),
    })
}

fn check_choice(choice: &ToolChoice, candidates: &[Tool]) -> Option<Review> {
    match choice {
        ToolChoice::Selected(_) => None,
        ToolChoice::Declined { reason, .. } => Some(Review::local(
            Feedback::success(format!("Selection declined: {}", reason)),
            "",
        )),
        ToolChoice::Unlisted(name) => {
            let names: Vec<&str> = candidates.iter().map(|t| t.name.as_str()).collect();
            Some(reject_locally(
                format!("'{}' is not a candidate tool", name),
                format!("choose exactly one of: {}", names.join(", ")),
            ))
        }
    }
}

fn check_draft(draft: &ActionDraft) -> Option<Review> {
    if let Some(declared) = draft.declared.as_ref().filter(|f| !f.is_success()) {
        return Some(reject_locally(
            format!("Action declined: {}", declared.message()),
            "produce a tool input that accomplishes the step",
        ));
    }
    draft
        .tool_input
        .trim()
        .is_empty()
        .then(|| reject_locally("tool input is empty", "provide the exact tool input"))
}

/// Outcome of one pass over the current step before it is committed.
struct Attempt {
    tools: Vec<Tool>,
    action: Option<Action>,
    feedback: Feedback,
}

impl Session {
    pub(super) async fn handle_task(&mut self) -> Result<Feedback> {
        self.context.phase = Phase::TaskHandling;
        let Some(step) = self.context.current_step().cloned() else {
            let feedback = Feedback::categorized(FailureCategory::NoActiveStep, "No unaccomplished step in the plan");
            return Ok(self.close_pass(feedback));
        };
        info!("Handling step {}: {}", step.name, step.goal);

        let attempt = match self.attempt_step(&step).await {
            Ok(attempt) => attempt,
            Err(e) if is_recoverable(&e) => Attempt {
                tools: Vec::new(),
                action: None,
                feedback: Feedback::from_error(&e),
            },
            Err(e) => return Err(e),
        };

        let feedback = self.commit_step(&step, attempt)?;
        Ok(self.close_pass(feedback))
    }

    async fn attempt_step(&mut self, step: &Step) -> Result<Attempt> {
        let services = Arc::clone(&self.services);

        let tools = match services.catalog.find_candidate_tools(step).await {
            Ok(tools) => tools,
            Err(e) => {
                warn!("Tool lookup failed for {}: {}", step.name, e);
                Vec::new()
            }
        };
        let lookup = if tools.is_empty() {
            Feedback::categorized(
                FailureCategory::NoSuitableTool,
                format!("No candidate tools for step '{}'", step.name),
            )
        } else {
            Feedback::success(format!("{} candidate tools", tools.len()))
        };
        self.logger.log(
            LogEntry::new(LogKind::CandidateTools {
                step_id: step.id.clone(),
                tools: tools.clone(),
            })
            .with_feedback(lookup.clone()),
        );
        if tools.is_empty() {
            return Ok(Attempt {
                tools,
                action: None,
                feedback: lookup,
            });
        }

        let tool = match self.choose_tool(step, &tools).await? {
            ToolChoice::Selected(tool) => tool,
            ToolChoice::Declined { category, reason } => {
                return Ok(Attempt {
                    tools,
                    action: None,
                    feedback: Feedback::categorized(category, reason),
                });
            }
            // rejected by the precheck, never accepted
            ToolChoice::Unlisted(name) => {
                return Err(DeusError::InvalidState(format!("Unlisted tool '{}' accepted", name)));
            }
        };

        let mut action = self.formulate_action(step, &tool).await?;
        let execution = self.execute(&action).await?;
        action.record_execution(execution.output.clone(), execution.feedback.clone());
        self.logger.log(
            LogEntry::new(LogKind::Execution {
                action_id: action.id.clone(),
                tool_input: action.tool_input.clone(),
                output: execution.output,
            })
            .with_feedback(execution.feedback.clone()),
        );

        let feedback = if execution.feedback.is_success() {
            Feedback::success(format!("Step '{}' accomplished with {}", step.name, tool.name))
        } else {
            execution.feedback
        };
        Ok(Attempt {
            tools,
            action: Some(action),
            feedback,
        })
    }

    async fn choose_tool(&mut self, step: &Step, candidates: &[Tool]) -> Result<ToolChoice> {
        let services = Arc::clone(&self.services);
        let listing: Vec<Value> = candidates
            .iter()
            .map(|t| json!({ "name": t.name, "description": t.description, "input_format": t.input_format }))
            .collect();

        let offered = candidates.to_vec();
        let producer = PromptedProducer::new(
            services.gateway.clone(),
            PromptKind::ToolSelection,
            "tool",
            json!({ "step_goal": step.goal, "tools": listing }),
            move |json| parse_tool_choice(json, &offered),
        );
        let offered = candidates.to_vec();
        let validator = PromptedValidator::new(
            services.gateway.clone(),
            PromptKind::ValidateToolSelection,
            json!({ "step_goal": step.goal }),
            |choice: &ToolChoice| match choice {
                ToolChoice::Selected(tool) => json!({ "tool_name": tool.name, "tool_description": tool.description }),
                _ => json!({}),
            },
        )
        .with_precheck(move |choice| check_choice(choice, &offered));

        let outcome = services.refine_loop().run(&mut self.logger, &producer, &validator).await;
        let (tool, feedback) = match &outcome {
            Ok(refined) => match &refined.value {
                ToolChoice::Selected(tool) => (Some(tool.clone()), refined.feedback.clone()),
                ToolChoice::Declined { category, reason } => (None, Feedback::categorized(*category, reason.clone())),
                ToolChoice::Unlisted(_) => (None, refined.feedback.clone()),
            },
            Err(e) => (None, Feedback::from_error(e)),
        };
        self.logger.log(
            LogEntry::new(LogKind::ToolSelection {
                step_id: step.id.clone(),
                tool,
            })
            .with_feedback(feedback),
        );
        outcome.map(|refined| refined.value)
    }

    async fn formulate_action(&mut self, step: &Step, tool: &Tool) -> Result<Action> {
        let services = Arc::clone(&self.services);
        let vars = json!({
            "step_goal": step.goal,
            "tool_name": tool.name,
            "tool_description": tool.description,
            "tool_input_format": tool.input_format,
        });
        let producer = PromptedProducer::new(
            services.gateway.clone(),
            PromptKind::TurnToAction,
            "action",
            vars.clone(),
            parse_action_draft,
        );
        let validator = PromptedValidator::new(
            services.gateway.clone(),
            PromptKind::ValidateAction,
            vars,
            |draft: &ActionDraft| json!({ "tool_input": draft.tool_input }),
        )
        .with_precheck(check_draft);

        match services.refine_loop().run(&mut self.logger, &producer, &validator).await {
            Ok(refined) => {
                let action = Action::new(&step.id, tool.clone(), refined.value.tool_input);
                self.logger.log(
                    LogEntry::new(LogKind::Action {
                        step_id: step.id.clone(),
                        action: Some(action.clone()),
                    })
                    .with_feedback(refined.feedback),
                );
                Ok(action)
            }
            Err(e) => {
                self.logger.log(
                    LogEntry::new(LogKind::Action {
                        step_id: step.id.clone(),
                        action: None,
                    })
                    .with_feedback(Feedback::from_error(&e)),
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, action: &Action) -> Result<Execution> {
        let services = Arc::clone(&self.services);
        let cancel = services.cancel_token().clone();
        let outcome = bounded(
            services.config.tool_timeout(),
            &cancel,
            services.executor.execute(&action.tool, &action.tool_input),
        )
        .await;
        match outcome {
            Ok(execution) => Ok(execution),
            Err(DeusError::Cancelled) => Err(DeusError::Cancelled),
            Err(e) => {
                warn!("Executing {} failed: {}", action.tool.name, e);
                Ok(Execution::failure("", e.to_string()))
            }
        }
    }

    /// Write the attempt into the plan. Only here does the step change.
    fn commit_step(&mut self, step: &Step, attempt: Attempt) -> Result<Feedback> {
        let plan = self
            .context
            .plan
            .as_mut()
            .ok_or_else(|| DeusError::InvalidState("Task handling without a plan".to_string()))?;
        let target = plan
            .step_mut(&step.id)
            .ok_or_else(|| DeusError::InvalidState(format!("Step {} left the plan", step.id)))?;

        if !attempt.tools.is_empty() {
            target.tools = attempt.tools;
        }
        if attempt.action.is_some() {
            target.action = attempt.action;
        }
        target.feedback = Some(attempt.feedback.clone());
        if attempt.feedback.is_success() {
            target.mark_accomplished();
            info!("Step {} accomplished", step.name);
        } else {
            warn!("Step {} failed: {}", step.name, attempt.feedback.message());
        }
        Ok(attempt.feedback)
    }

    /// Record the pass verdict and pick the next phase.
    fn close_pass(&mut self, feedback: Feedback) -> Feedback {
        if self.context.refresh_progress() {
            info!("Plan accomplished");
        }
        if !self.context.is_finished() {
            self.context.phase = Phase::Planning;
        }
        self.context.current_feedback = Some(feedback.clone());
        self.logger.set_outcome(feedback.clone());
        feedback
    }
}
