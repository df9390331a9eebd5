//! Scope gathering: goal, clarifying rounds, description

use std::sync::Arc;

use log::{debug, info};
use serde_json::json;

use super::session::Session;
use crate::audit::{LogEntry, LogKind};
use crate::domain::{Phase, covers, merge_verbatim};
use crate::error::{DeusError, Result};
use crate::feedback::{FailureCategory, Feedback};
use crate::generator::{extract_json, parse_feedback, parse_guidance, parse_string_list, parse_text};
use crate::human::ask_bounded;
use crate::prompt::PromptKind;
use crate::refine::{PromptedProducer, PromptedValidator, reject_locally};

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Session {
    pub(super) async fn establish_scope(&mut self) -> Result<Feedback> {
        self.context.phase = Phase::ScopeGathering;
        self.extract_goal().await?;

        let rounds = self.services.config.max_scope_rounds.max(1);
        let mut guidance = String::new();
        let mut verdict = Feedback::failure("no clarifying round ran");
        for round in 1..=rounds {
            info!("Scope round {}/{}", round, rounds);
            self.clarify(&guidance).await?;
            let (feedback, next_guidance) = self.check_completeness().await?;
            if feedback.is_success() {
                verdict = feedback;
                break;
            }
            guidance = if next_guidance.is_empty() {
                feedback.message().to_string()
            } else {
                next_guidance
            };
            verdict = feedback;
            if round == rounds {
                return Err(DeusError::RetryExhausted {
                    field: "scope".to_string(),
                    attempts: rounds,
                    last: verdict,
                });
            }
        }
        debug!("Scope accepted: {}", verdict.message());

        self.describe_scope().await?;
        self.context.phase = Phase::Planning;
        Ok(Feedback::success(format!(
            "Scope established with {} requirements",
            self.context.scope.requirements.len()
        )))
    }

    async fn extract_goal(&mut self) -> Result<()> {
        let services = Arc::clone(&self.services);
        let query = self.context.scope.user_query.clone();
        let producer = PromptedProducer::new(
            services.gateway.clone(),
            PromptKind::RetrieveGoal,
            "user_goal",
            json!({ "user_query": query }),
            |json| parse_text(json, "user_goal").ok_or_else(|| "missing user_goal".to_string()),
        );
        let validator = PromptedValidator::new(
            services.gateway.clone(),
            PromptKind::ValidateGoal,
            json!({ "user_query": query }),
            |goal: &String| json!({ "user_goal": goal }),
        );

        let refined = services.refine_loop().run(&mut self.logger, &producer, &validator).await?;
        let previous_goal = self.context.scope.user_goal.replace(refined.value.clone());
        self.logger.log(
            LogEntry::new(LogKind::GoalUpdate {
                previous_goal,
                goal: refined.value,
            })
            .with_feedback(refined.feedback),
        );
        Ok(())
    }

    /// One round: ask, hear the answer, extract its requirements, merge them.
    async fn clarify(&mut self, guidance: &str) -> Result<()> {
        let services = Arc::clone(&self.services);
        let scope = &self.context.scope;
        let vars = json!({
            "user_goal": scope.user_goal,
            "requirements": scope.requirements,
            "qa_history": self.logger.questions_answers(),
            "validation_instructions": guidance,
        });
        let (prompt, response) = services.gateway.ask(PromptKind::AskUser, &vars).await?;
        let parsed = extract_json("questions", &response)
            .and_then(|json| match parse_string_list(&json, "questions") {
                Some(questions) if !questions.is_empty() => Ok((json, questions)),
                _ => Err(DeusError::malformed("questions", "missing questions")),
            });
        let (json, questions) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                self.logger.log(
                    LogEntry::retrieval("questions", prompt, response, None)
                        .with_feedback(Feedback::categorized(FailureCategory::MalformedOutput, e.to_string())),
                );
                return Err(e);
            }
        };
        self.logger.log(
            LogEntry::retrieval("questions", prompt, response, Some(json))
                .with_feedback(Feedback::success(format!("{} questions", questions.len()))),
        );

        let asked = numbered(&questions);
        let cancel = services.cancel_token().clone();
        let answer = ask_bounded(
            services.human.as_ref(),
            &asked,
            services.config.human_timeout(),
            &cancel,
        )
        .await?;

        let delta = self.extract_requirements(&asked, &answer).await?;
        self.logger.log(
            LogEntry::new(LogKind::Refinement {
                questions,
                answer,
                requirements: delta.clone(),
            })
            .with_feedback(Feedback::success(format!("{} requirements from answer", delta.len()))),
        );

        let merged = self.merge_requirements(&delta).await?;
        self.context.scope.requirements = merged;
        Ok(())
    }

    async fn extract_requirements(&mut self, questions: &str, answer: &str) -> Result<Vec<String>> {
        let services = Arc::clone(&self.services);
        let producer = PromptedProducer::new(
            services.gateway.clone(),
            PromptKind::RetrieveRequirements,
            "requirements",
            json!({
                "user_goal": self.context.scope.user_goal,
                "questions": questions,
                "answer": answer,
            }),
            |json| parse_string_list(json, "requirements").ok_or_else(|| "missing requirements".to_string()),
        );
        let validator = PromptedValidator::new(
            services.gateway.clone(),
            PromptKind::ValidateRequirements,
            json!({ "questions": questions, "answer": answer }),
            |requirements: &Vec<String>| json!({ "requirements": requirements }),
        );
        let refined = services.refine_loop().run(&mut self.logger, &producer, &validator).await?;
        Ok(refined.value)
    }

    /// Merge a requirements delta into the running set.
    ///
    /// A delta the set already covers, or a first delta, merges verbatim;
    /// anything else goes through the generator and its validator.
    async fn merge_requirements(&mut self, delta: &[String]) -> Result<Vec<String>> {
        let existing = self.context.scope.requirements.clone();
        if existing.is_empty() || covers(&existing, delta) {
            return Ok(merge_verbatim(&existing, delta));
        }

        let services = Arc::clone(&self.services);
        let producer = PromptedProducer::new(
            services.gateway.clone(),
            PromptKind::MergeRequirements,
            "merged_requirements",
            json!({ "existing": existing, "delta": delta }),
            |json| parse_string_list(json, "requirements").ok_or_else(|| "missing requirements".to_string()),
        );
        let validator = PromptedValidator::new(
            services.gateway.clone(),
            PromptKind::ValidateMerge,
            json!({ "existing": existing, "delta": delta }),
            |merged: &Vec<String>| json!({ "merged": merged }),
        )
        .with_precheck(|merged| {
            merged
                .is_empty()
                .then(|| reject_locally("merged list is empty", "keep every item from both lists"))
        });
        let refined = services.refine_loop().run(&mut self.logger, &producer, &validator).await?;
        Ok(refined.value)
    }

    /// One completeness verdict over the merged requirements.
    async fn check_completeness(&mut self) -> Result<(Feedback, String)> {
        let services = Arc::clone(&self.services);
        let vars = json!({
            "user_goal": self.context.scope.user_goal,
            "requirements": self.context.scope.requirements,
            "qa_history": self.logger.questions_answers(),
        });
        let (prompt, response) = services.gateway.ask(PromptKind::ValidateScope, &vars).await?;
        let verdict = extract_json("scope", &response).and_then(|json| {
            parse_feedback(&json)
                .map(|feedback| (feedback, parse_guidance(&json)))
                .ok_or_else(|| DeusError::malformed("scope", "missing feedback.success"))
        });
        let (feedback, guidance) = match verdict {
            Ok(verdict) => verdict,
            Err(e) => {
                self.logger.log(
                    LogEntry::validation("scope", prompt, response, "")
                        .with_feedback(Feedback::categorized(FailureCategory::MalformedOutput, e.to_string())),
                );
                return Err(e);
            }
        };
        let feedback = if feedback.is_success() {
            feedback
        } else {
            Feedback::categorized(FailureCategory::ValidationRejected, feedback.message())
        };
        self.logger
            .log(LogEntry::validation("scope", prompt, response, guidance.clone()).with_feedback(feedback.clone()));
        Ok((feedback, guidance))
    }

    async fn describe_scope(&mut self) -> Result<()> {
        let services = Arc::clone(&self.services);
        let vars = json!({
            "user_goal": self.context.scope.user_goal,
            "requirements": self.context.scope.requirements,
        });
        let producer = PromptedProducer::new(
            services.gateway.clone(),
            PromptKind::DescribeScope,
            "description",
            vars.clone(),
            |json| parse_text(json, "description").ok_or_else(|| "missing description".to_string()),
        );
        let validator = PromptedValidator::new(
            services.gateway.clone(),
            PromptKind::ValidateDescription,
            vars,
            |description: &String| json!({ "description": description }),
        );
        let refined = services.refine_loop().run(&mut self.logger, &producer, &validator).await?;
        self.context.scope.description = Some(refined.value);
        Ok(())
    }
}
