//! Generator-backed producers and validators
//!
//! A [`Gateway`] pairs the session's generator handle with its prompt
//! catalog. [`PromptedProducer`] and [`PromptedValidator`] render a prompt
//! kind with their variables, call the generator once and parse the reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::traits::{Producer, Production, Review, Validator};
use crate::audit::LogEntry;
use crate::error::{DeusError, Result};
use crate::feedback::{FailureCategory, Feedback};
use crate::generator::{GeneratorHandle, extract_json, parse_feedback, parse_guidance};
use crate::prompt::{PromptCatalog, PromptKind};

/// Turns the decoded reply object into a candidate, or says why it can't.
pub type ParseFn<T> = Box<dyn Fn(&Value) -> std::result::Result<T, String> + Send + Sync>;

/// Exposes a candidate to the validator's template.
pub type RenderFn<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;

/// Local verdict reached before (or instead of) calling the generator.
pub type PrecheckFn<T> = Box<dyn Fn(&T) -> Option<Review> + Send + Sync>;

/// The session's route to the generator.
#[derive(Clone)]
pub struct Gateway {
    generator: GeneratorHandle,
    prompts: Arc<PromptCatalog>,
}

impl Gateway {
    pub fn new(generator: GeneratorHandle, prompts: Arc<PromptCatalog>) -> Self {
        Self { generator, prompts }
    }

    /// Render `kind` and call the generator. Returns the prompt and reply.
    pub async fn ask(&self, kind: PromptKind, vars: &Value) -> Result<(String, String)> {
        let prompt = self.prompts.render(kind, vars)?;
        let response = self.generator.generate(&prompt).await?;
        Ok((prompt, response))
    }
}

/// Shallow-merge two JSON objects; keys in `extra` win.
pub fn merge_vars(base: &Value, extra: Value) -> Value {
    let mut merged = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(extra) = extra {
        merged.extend(extra);
    }
    Value::Object(merged)
}

pub struct PromptedProducer<T> {
    gateway: Gateway,
    kind: PromptKind,
    field: String,
    vars: Value,
    parse: ParseFn<T>,
}

impl<T> PromptedProducer<T> {
    pub fn new(
        gateway: Gateway,
        kind: PromptKind,
        field: impl Into<String>,
        vars: Value,
        parse: impl Fn(&Value) -> std::result::Result<T, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            gateway,
            kind,
            field: field.into(),
            vars,
            parse: Box::new(parse),
        }
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Producer for PromptedProducer<T> {
    type Candidate = T;

    fn field(&self) -> &str {
        &self.field
    }

    async fn produce(&self, guidance: &str) -> Result<Production<T>> {
        let vars = merge_vars(&self.vars, serde_json::json!({ "validation_instructions": guidance }));
        let (prompt, response) = self.gateway.ask(self.kind, &vars).await?;

        let json = match extract_json(&self.field, &response) {
            Ok(json) => json,
            Err(e) => {
                let entry = LogEntry::retrieval(&self.field, prompt, response, None)
                    .with_feedback(Feedback::categorized(FailureCategory::MalformedOutput, e.to_string()));
                return Ok(Production::malformed(e.to_string(), entry));
            }
        };

        match (self.parse)(&json) {
            Ok(candidate) => {
                let entry = LogEntry::retrieval(&self.field, prompt, response, Some(json))
                    .with_feedback(Feedback::success(format!("parsed {}", self.field)));
                Ok(Production::parsed(candidate, entry))
            }
            Err(problem) => {
                let entry = LogEntry::retrieval(&self.field, prompt, response, Some(json))
                    .with_feedback(Feedback::categorized(FailureCategory::MalformedOutput, problem.clone()));
                Ok(Production::malformed(problem, entry))
            }
        }
    }
}

pub struct PromptedValidator<T> {
    gateway: Gateway,
    kind: PromptKind,
    vars: Value,
    render: RenderFn<T>,
    precheck: Option<PrecheckFn<T>>,
}

impl<T> PromptedValidator<T> {
    pub fn new(
        gateway: Gateway,
        kind: PromptKind,
        vars: Value,
        render: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            gateway,
            kind,
            vars,
            render: Box::new(render),
            precheck: None,
        }
    }

    /// Judge locally first; a `Some` verdict skips the generator call.
    pub fn with_precheck(mut self, precheck: impl Fn(&T) -> Option<Review> + Send + Sync + 'static) -> Self {
        self.precheck = Some(Box::new(precheck));
        self
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Validator<T> for PromptedValidator<T> {
    async fn review(&self, candidate: &T) -> Result<Review> {
        if let Some(review) = self.precheck.as_ref().and_then(|check| check(candidate)) {
            return Ok(review);
        }

        let vars = merge_vars(&self.vars, (self.render)(candidate));
        let (prompt, response) = self.gateway.ask(self.kind, &vars).await?;
        let json = match extract_json(self.kind.as_str(), &response) {
            Ok(json) => json,
            Err(DeusError::MalformedOutput { reason, .. }) => return Ok(Review::malformed(reason, prompt, response)),
            Err(e) => return Err(e),
        };
        let Some(feedback) = parse_feedback(&json) else {
            return Ok(Review::malformed("missing feedback.success", prompt, response));
        };
        let feedback = if feedback.is_success() {
            feedback
        } else {
            Feedback::categorized(FailureCategory::ValidationRejected, feedback.message())
        };

        Ok(Review {
            feedback,
            guidance: parse_guidance(&json),
            prompt,
            response,
            problem: None,
        })
    }
}

/// Local rejection with guidance.
pub fn reject_locally(message: impl Into<String>, guidance: impl Into<String>) -> Review {
    Review::local(
        Feedback::categorized(FailureCategory::ValidationRejected, message),
        guidance,
    )
}
