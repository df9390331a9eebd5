//! Session - one user query driven through scope, plan and task phases
//!
//! The three phases are workflow steps over the [`Session`]:
//!
//! ```text
//! establish-scope → planning → task-handling ─┐
//!                      ▲                       │ step done, plan open
//!                      └───────────────────────┘
//! ```
//!
//! A phase that hits an unrecoverable error halts the session: its
//! transition returns `None` and the report carries the reason.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use super::config::SessionConfig;
use crate::audit::Logger;
use crate::domain::Context;
use crate::error::{DeusError, Result};
use crate::feedback::{Feedback, FeedbackBundle};
use crate::generator::{Generator, GeneratorHandle};
use crate::human::Human;
use crate::prompt::PromptCatalog;
use crate::refine::{Gateway, RefineLoop};
use crate::tools::{ToolCatalog, ToolExecutor};
use crate::workflow::{StepBody, Workflow, WorkflowData, WorkflowExecutor, WorkflowStep};

pub const ESTABLISH_SCOPE: &str = "establish-scope";
pub const PLANNING: &str = "planning";
pub const TASK_HANDLING: &str = "task-handling";

/// The collaborators a session talks to.
pub struct Services {
    pub gateway: Gateway,
    pub catalog: Arc<dyn ToolCatalog>,
    pub executor: Arc<dyn ToolExecutor>,
    pub human: Arc<dyn Human>,
    pub config: SessionConfig,
    cancel: CancellationToken,
}

impl Services {
    pub fn new(
        generator: Arc<dyn Generator>,
        prompts: PromptCatalog,
        catalog: Arc<dyn ToolCatalog>,
        executor: Arc<dyn ToolExecutor>,
        human: Arc<dyn Human>,
        config: SessionConfig,
    ) -> Self {
        Self::with_cancel(generator, prompts, catalog, executor, human, config, CancellationToken::new())
    }

    /// Like [`Services::new`] with a caller-owned cancellation token.
    pub fn with_cancel(
        generator: Arc<dyn Generator>,
        prompts: PromptCatalog,
        catalog: Arc<dyn ToolCatalog>,
        executor: Arc<dyn ToolExecutor>,
        human: Arc<dyn Human>,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let handle = GeneratorHandle::new(generator, config.generator_timeout(), cancel.clone());
        Self {
            gateway: Gateway::new(handle, Arc::new(prompts)),
            catalog,
            executor,
            human,
            config,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn refine_loop(&self) -> RefineLoop {
        RefineLoop::new(self.config.max_attempts)
    }
}

/// Final state of a session.
#[derive(Debug)]
pub struct SessionReport {
    /// Id of the workflow run that drove the session
    pub workflow_id: String,
    pub context: Context,
    pub logger: Logger,
    pub feedback: FeedbackBundle,
    /// Why the session stopped early, if it did
    pub halted: Option<Feedback>,
    /// Workflow steps in the order they ran
    pub visited: Vec<String>,
}

impl SessionReport {
    pub fn finished(&self) -> bool {
        self.context.is_finished()
    }

    /// The verdict that explains how the session ended.
    pub fn last_feedback(&self) -> Option<&Feedback> {
        self.halted.as_ref().or(self.context.current_feedback.as_ref())
    }
}

pub struct Session {
    pub context: Context,
    pub logger: Logger,
    pub feedback: FeedbackBundle,
    pub(super) services: Arc<Services>,
    pub(super) halted: Option<Feedback>,
    pub(super) passes: u32,
}

impl WorkflowData for Session {
    fn feedback_bundle(&mut self) -> &mut FeedbackBundle {
        &mut self.feedback
    }
}

impl Session {
    pub fn new(user_query: impl Into<String>, services: Arc<Services>) -> Self {
        let context = Context::new(user_query);
        let logger = Logger::new(&context);
        Self {
            context,
            logger,
            feedback: FeedbackBundle::new(),
            services,
            halted: None,
            passes: 0,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Drive the session until it finishes or halts.
    pub async fn run(mut self) -> Result<SessionReport> {
        info!("Session starting: {}", self.context.scope.user_query);
        let workflow = Self::workflow();
        let run = WorkflowExecutor::new().run(&workflow, &mut self).await?;

        if self.context.is_finished() {
            info!("Session finished after {} steps", run.visited.len());
        } else {
            warn!("Session stopped unfinished after {} steps", run.visited.len());
        }

        Ok(SessionReport {
            workflow_id: run.workflow_id,
            context: self.context,
            logger: self.logger,
            feedback: self.feedback,
            halted: self.halted,
            visited: run.visited,
        })
    }

    /// The scope → plan → task state machine as a workflow.
    pub fn workflow() -> Workflow<Session> {
        Workflow::new("deusflow")
            .with_step(
                WorkflowStep::new(ESTABLISH_SCOPE, ScopePhase, |s: &Session| {
                    (!s.is_halted()).then(|| PLANNING.to_string())
                })
                .with_description("Extract the goal, gather requirements, describe the scope"),
            )
            .with_step(
                WorkflowStep::new(PLANNING, PlanningPhase, |s: &Session| {
                    s.keeps_going().then(|| TASK_HANDLING.to_string())
                })
                .with_description("Create or update the plan"),
            )
            .with_step(
                WorkflowStep::new(TASK_HANDLING, TaskPhase, |s: &Session| {
                    s.keeps_going().then(|| PLANNING.to_string())
                })
                .with_description("Bind the current step to a tool and execute it"),
            )
    }

    fn keeps_going(&self) -> bool {
        !self.is_halted() && !self.context.is_finished()
    }

    /// Stop the session with `feedback` as the reason.
    pub(super) fn halt(&mut self, feedback: Feedback) -> Feedback {
        warn!("Session halted: {}", feedback.message());
        self.context.current_feedback = Some(feedback.clone());
        self.halted = Some(feedback.clone());
        feedback
    }

    /// Fold a phase error into its feedback, halting when the error is fatal
    /// to the phase.
    pub(super) fn settle(&mut self, outcome: Result<Feedback>) -> Feedback {
        match outcome {
            Ok(feedback) => feedback,
            Err(e) => self.halt(Feedback::from_error(&e)),
        }
    }
}

struct ScopePhase;

#[async_trait]
impl StepBody<Session> for ScopePhase {
    async fn run(&self, session: &mut Session) -> Feedback {
        let outcome = session.establish_scope().await;
        session.settle(outcome)
    }
}

struct PlanningPhase;

#[async_trait]
impl StepBody<Session> for PlanningPhase {
    async fn run(&self, session: &mut Session) -> Feedback {
        let outcome = session.plan().await;
        session.settle(outcome)
    }
}

struct TaskPhase;

#[async_trait]
impl StepBody<Session> for TaskPhase {
    async fn run(&self, session: &mut Session) -> Feedback {
        let outcome = session.handle_task().await;
        session.settle(outcome)
    }
}

/// True for errors that only cost the current attempt, not the session.
pub(super) fn is_recoverable(err: &DeusError) -> bool {
    !err.aborts_phase()
}
