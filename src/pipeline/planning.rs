//! Planning: create the plan once, then revise it after every task pass

use std::sync::Arc;

use log::{info, warn};
use serde_json::json;

use super::session::{Session, is_recoverable};
use crate::audit::{LogEntry, LogKind};
use crate::domain::{Phase, Plan};
use crate::error::{DeusError, Result};
use crate::feedback::{FailureCategory, Feedback};
use crate::generator::parse_plan_entries;
use crate::prompt::PromptKind;
use crate::refine::{PromptedProducer, PromptedValidator, reject_locally};

fn parse_plan(json: &serde_json::Value) -> std::result::Result<Plan, String> {
    let entries = parse_plan_entries(json).ok_or_else(|| "missing or invalid plan".to_string())?;
    Ok(Plan::from_entries(entries))
}

fn reject_empty(plan: &Plan) -> Option<crate::refine::Review> {
    plan.is_empty()
        .then(|| reject_locally("plan has no steps", "list at least one step"))
}

impl Session {
    pub(super) async fn plan(&mut self) -> Result<Feedback> {
        self.context.phase = Phase::Planning;
        let budget = self.services.config.max_iterations.max(1);
        if self.passes >= budget {
            return Ok(self.halt(Feedback::categorized(
                FailureCategory::RetryExhausted,
                format!("Gave up after {} planning passes", self.passes),
            )));
        }
        self.passes += 1;

        let feedback = match self.context.plan.clone() {
            None => self.create_plan().await?,
            Some(prior) => {
                let index = self.logger.add_iteration(&self.context);
                info!("Iteration {}: revising plan", index);
                self.update_plan(prior).await?
            }
        };

        if !self.is_halted() && !self.context.is_finished() {
            self.context.phase = Phase::TaskHandling;
        }
        Ok(feedback)
    }

    async fn create_plan(&mut self) -> Result<Feedback> {
        let services = Arc::clone(&self.services);
        let description = self.context.scope.description.clone().unwrap_or_default();
        let producer = PromptedProducer::new(
            services.gateway.clone(),
            PromptKind::CreatePlan,
            "plan",
            json!({ "description": description }),
            parse_plan,
        );
        let validator = PromptedValidator::new(
            services.gateway.clone(),
            PromptKind::ValidateCreatePlan,
            json!({ "description": description }),
            |plan: &Plan| json!({ "plan": plan.to_string() }),
        )
        .with_precheck(reject_empty);

        match services.refine_loop().run(&mut self.logger, &producer, &validator).await {
            Ok(refined) => {
                let plan = refined.value;
                info!("Plan created with {} steps", plan.len());
                self.logger.log(
                    LogEntry::new(LogKind::PlanUpdate {
                        previous_plan: None,
                        plan: Some(plan.clone()),
                    })
                    .with_feedback(refined.feedback),
                );
                self.context.set_plan(plan);
                Ok(Feedback::success("Plan created"))
            }
            Err(e) => {
                self.logger.log(
                    LogEntry::new(LogKind::PlanUpdate {
                        previous_plan: None,
                        plan: None,
                    })
                    .with_feedback(Feedback::from_error(&e)),
                );
                // no plan means nothing to fall back on
                Err(e)
            }
        }
    }

    async fn update_plan(&mut self, prior: Plan) -> Result<Feedback> {
        let services = Arc::clone(&self.services);
        let description = self.context.scope.description.clone().unwrap_or_default();
        let last_feedback = self
            .context
            .current_feedback
            .as_ref()
            .map(|f| f.message().to_string())
            .unwrap_or_default();

        let carried = prior.clone();
        let producer = PromptedProducer::new(
            services.gateway.clone(),
            PromptKind::UpdatePlan,
            "plan",
            json!({
                "description": description,
                "plan": prior.to_string(),
                "last_feedback": last_feedback,
            }),
            move |json| {
                let mut plan = parse_plan(json)?;
                plan.carry_over(&carried);
                Ok(plan)
            },
        );
        let guard = prior.clone();
        let validator = PromptedValidator::new(
            services.gateway.clone(),
            PromptKind::ValidateUpdatePlan,
            json!({
                "description": description,
                "previous_plan": prior.to_string(),
                "last_feedback": last_feedback,
            }),
            |plan: &Plan| json!({ "plan": plan.to_string() }),
        )
        .with_precheck(move |plan| {
            let dropped = plan.dropped_accomplished(&guard);
            if !dropped.is_empty() {
                return Some(reject_locally(
                    format!("completed steps were dropped: {}", dropped.join(", ")),
                    format!("keep these completed steps by name: {}", dropped.join(", ")),
                ));
            }
            reject_empty(plan)
        });

        match services.refine_loop().run(&mut self.logger, &producer, &validator).await {
            Ok(refined) => {
                let plan = refined.value;
                info!("Plan revised: {} steps", plan.len());
                self.logger.log(
                    LogEntry::new(LogKind::PlanUpdate {
                        previous_plan: Some(prior),
                        plan: Some(plan.clone()),
                    })
                    .with_feedback(refined.feedback),
                );
                self.context.set_plan(plan);
                Ok(Feedback::success("Plan updated"))
            }
            Err(e) if is_recoverable(&e) => {
                warn!("Plan revision failed, keeping the current plan: {}", e);
                let feedback = Feedback::from_error(&e);
                self.logger.log(
                    LogEntry::new(LogKind::PlanUpdate {
                        previous_plan: Some(prior),
                        plan: None,
                    })
                    .with_feedback(feedback.clone()),
                );
                self.context.refresh_progress();
                Ok(feedback)
            }
            Err(e) => Err(e),
        }
    }
}
