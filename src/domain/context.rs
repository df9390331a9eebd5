//! Context - the single unit of mutable session state

use serde::{Deserialize, Serialize};

use super::plan::{Plan, Step};
use super::scope::Scope;
use crate::feedback::Feedback;

/// Where the session is in the scope → plan → task cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ScopeGathering,
    Planning,
    TaskHandling,
    Finished,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub scope: Scope,
    pub plan: Option<Plan>,
    /// Id of the step task handling works on
    pub current_step: Option<String>,
    finished: bool,
    pub current_feedback: Option<Feedback>,
    pub phase: Phase,
}

impl Context {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            scope: Scope::new(user_query),
            plan: None,
            current_step: None,
            finished: false,
            current_feedback: None,
            phase: Phase::ScopeGathering,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Install a plan and point `current_step` at its first open step.
    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.refresh_progress();
    }

    /// Resolve `current_step` against the plan.
    pub fn current_step(&self) -> Option<&Step> {
        let id = self.current_step.as_deref()?;
        self.plan.as_ref()?.step(id)
    }

    /// Recompute `current_step` and latch `finished` once the plan is done.
    ///
    /// Returns true only on the call that sets the latch.
    pub fn refresh_progress(&mut self) -> bool {
        let Some(plan) = &self.plan else {
            return false;
        };
        self.current_step = plan.current_step().map(|s| s.id.clone());
        if !self.finished && plan.check_accomplished() {
            self.finished = true;
            self.phase = Phase::Finished;
            return true;
        }
        false
    }
}
