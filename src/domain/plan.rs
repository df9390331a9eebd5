//! Plan and Step - the ordered work that realizes a scope
//!
//! Progress is strictly sequential over the stored order: the current step is
//! the first one not yet accomplished. `blocked_by`/`blocking` are carried as
//! topology only and never gate progress.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use super::action::Action;
use super::tool::Tool;
use crate::error::{DeusError, Result};
use crate::feedback::Feedback;
use crate::generator::PlanEntry;
use crate::id::generate_step_id;

/// One unit of planned work, mapped to at most one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub goal: String,
    /// Candidate tools found for this step
    pub tools: Vec<Tool>,
    pub action: Option<Action>,
    pub feedback: Option<Feedback>,
    accomplished: bool,
    /// Ids of steps this one waits on
    pub blocked_by: Vec<String>,
    /// Ids of steps waiting on this one
    pub blocking: Vec<String>,
}

impl Step {
    pub fn new(name: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: generate_step_id(),
            name: name.into(),
            goal: goal.into(),
            tools: Vec::new(),
            action: None,
            feedback: None,
            accomplished: false,
            blocked_by: Vec::new(),
            blocking: Vec::new(),
        }
    }

    pub fn is_accomplished(&self) -> bool {
        self.accomplished
    }

    /// One-way: there is no way back to unaccomplished.
    pub fn mark_accomplished(&mut self) {
        self.accomplished = true;
    }
}

/// Ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Build a plan from parsed planner output, resolving `blocked_by` names
    /// to step ids and filling in the reverse `blocking` edges.
    pub fn from_entries(entries: Vec<PlanEntry>) -> Self {
        let mut steps: Vec<Step> = Vec::with_capacity(entries.len());
        let mut ids = HashSet::new();
        for entry in &entries {
            let mut step = Step::new(&entry.name, &entry.goal);
            while !ids.insert(step.id.clone()) {
                step.id = generate_step_id();
            }
            steps.push(step);
        }

        let by_name: HashMap<String, String> = steps.iter().map(|s| (s.name.clone(), s.id.clone())).collect();
        for (step, entry) in steps.iter_mut().zip(&entries) {
            for dep in &entry.blocked_by {
                match by_name.get(dep) {
                    Some(id) if *id != step.id => step.blocked_by.push(id.clone()),
                    Some(_) => warn!("Step {} lists itself as a blocker", step.name),
                    None => warn!("Step {} blocked by unknown step {}", step.name, dep),
                }
            }
        }

        let mut plan = Self { steps };
        plan.rebuild_blocking();
        plan
    }

    fn rebuild_blocking(&mut self) {
        let mut blocking: HashMap<String, Vec<String>> = HashMap::new();
        for step in &self.steps {
            for dep in &step.blocked_by {
                blocking.entry(dep.clone()).or_default().push(step.id.clone());
            }
        }
        for step in &mut self.steps {
            step.blocking = blocking.remove(&step.id).unwrap_or_default();
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    pub fn step_by_name(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// First step not yet accomplished, by list order.
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| !s.accomplished)
    }

    /// Position of [`Plan::current_step`].
    pub fn current_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| !s.accomplished)
    }

    /// AND over all steps.
    pub fn check_accomplished(&self) -> bool {
        self.steps.iter().all(|s| s.accomplished)
    }

    pub fn mark_accomplished(&mut self, step_id: &str) -> Result<()> {
        let step = self
            .step_mut(step_id)
            .ok_or_else(|| DeusError::InvalidState(format!("No step with id {}", step_id)))?;
        step.mark_accomplished();
        Ok(())
    }

    /// Names of accomplished steps in `prior` that this plan no longer has.
    pub fn dropped_accomplished(&self, prior: &Plan) -> Vec<String> {
        prior
            .steps
            .iter()
            .filter(|s| s.accomplished && self.step_by_name(&s.name).is_none())
            .map(|s| s.name.clone())
            .collect()
    }

    /// Keep identity and progress of steps that survive a plan update.
    ///
    /// Steps are matched by name. A matched step takes the prior id, tools,
    /// action, feedback and accomplished flag; dependency ids are rewritten to
    /// follow.
    pub fn carry_over(&mut self, prior: &Plan) {
        let mut renamed: HashMap<String, String> = HashMap::new();
        for step in &mut self.steps {
            let Some(old) = prior.step_by_name(&step.name) else {
                continue;
            };
            renamed.insert(step.id.clone(), old.id.clone());
            step.id = old.id.clone();
            step.tools = old.tools.clone();
            step.action = old.action.clone();
            step.feedback = old.feedback.clone();
            step.accomplished = old.accomplished;
        }

        for step in &mut self.steps {
            for dep in &mut step.blocked_by {
                if let Some(id) = renamed.get(dep) {
                    *dep = id.clone();
                }
            }
        }
        self.rebuild_blocking();
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            let mark = if step.accomplished { "x" } else { " " };
            writeln!(f, "{}. [{}] {}: {}", i + 1, mark, step.name, step.goal)?;
        }
        Ok(())
    }
}
