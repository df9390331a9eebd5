//! Workflow engine - named steps driven by data-dependent transitions
//!
//! A [`Workflow`] is an ordered list of [`WorkflowStep`]s. The executor
//! starts at the first step, runs its body, appends the resulting feedback to
//! the data's bundle and asks the step's transition for the next step name.
//! Bodies are total: failures come back as failed feedback, never as errors.

use async_trait::async_trait;
use log::{debug, info};

use crate::error::{DeusError, Result};
use crate::feedback::{Feedback, FeedbackBundle};
use crate::id::{generate_workflow_id, generate_workflow_step_id};

/// The work a step does on the shared data.
#[async_trait]
pub trait StepBody<D>: Send + Sync {
    async fn run(&self, data: &mut D) -> Feedback;
}

/// Picks the next step by name, or `None` to halt.
pub type Transition<D> = Box<dyn Fn(&D) -> Option<String> + Send + Sync>;

/// Data a workflow can run over.
pub trait WorkflowData: Send {
    fn feedback_bundle(&mut self) -> &mut FeedbackBundle;
}

pub struct WorkflowStep<D> {
    pub id: String,
    pub name: String,
    pub description: String,
    body: Box<dyn StepBody<D>>,
    next: Transition<D>,
}

impl<D> WorkflowStep<D> {
    pub fn new(
        name: impl Into<String>,
        body: impl StepBody<D> + 'static,
        next: impl Fn(&D) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: generate_workflow_step_id(),
            name: name.into(),
            description: String::new(),
            body: Box::new(body),
            next: Box::new(next),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

pub struct Workflow<D> {
    pub id: String,
    pub name: String,
    steps: Vec<WorkflowStep<D>>,
}

impl<D> Workflow<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: generate_workflow_id(),
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: WorkflowStep<D>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[WorkflowStep<D>] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&WorkflowStep<D>> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Trace of one executor run.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub workflow_id: String,
    /// Step names in the order they ran
    pub visited: Vec<String>,
    pub last_feedback: Option<Feedback>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowExecutor;

impl WorkflowExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `workflow` over `data` until a transition returns `None`.
    ///
    /// Fails only on an empty workflow or a transition to an unknown step.
    pub async fn run<D: WorkflowData>(&self, workflow: &Workflow<D>, data: &mut D) -> Result<WorkflowRun> {
        let mut current = workflow
            .steps
            .first()
            .ok_or_else(|| DeusError::InvalidState(format!("Workflow {} has no steps", workflow.name)))?;
        info!("Workflow {} ({}) starting at {}", workflow.name, workflow.id, current.name);

        let mut run = WorkflowRun {
            workflow_id: workflow.id.clone(),
            visited: Vec::new(),
            last_feedback: None,
        };

        loop {
            let feedback = current.body.run(data).await;
            debug!(
                "step {} -> {} ({})",
                current.name,
                if feedback.is_success() { "ok" } else { "failed" },
                feedback.message()
            );
            data.feedback_bundle().append(feedback.clone());
            run.visited.push(current.name.clone());
            run.last_feedback = Some(feedback);

            let Some(next) = (current.next)(data) else {
                break;
            };
            current = workflow.step(&next).ok_or_else(|| {
                DeusError::InvalidState(format!("Step {} transitions to unknown step {}", current.name, next))
            })?;
        }

        info!("Workflow {} halted after {} steps", workflow.name, run.visited.len());
        Ok(run)
    }
}
