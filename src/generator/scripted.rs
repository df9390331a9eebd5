//! Scripted generator for tests and dry runs
//!
//! Replies are queued per [`PromptKind`]; the kind is read from the tag line
//! every rendered prompt starts with.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{Generator, GeneratorError};
use crate::prompt::PromptKind;

/// One canned generator outcome.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this text
    Text(String),
    /// Fail with a service error
    Fail(String),
    /// Never answer (exercises timeouts and cancellation)
    Stall,
}

#[derive(Default)]
struct Script {
    queued: HashMap<PromptKind, VecDeque<ScriptedReply>>,
    always: HashMap<PromptKind, ScriptedReply>,
    calls: Vec<(Option<PromptKind>, String)>,
}

/// Generator that answers from per-kind queues.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<Script>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, kind: PromptKind, reply: ScriptedReply) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.queued.entry(kind).or_default().push_back(reply);
        }
        self
    }

    /// Queue a text reply for the next prompt of this kind.
    pub fn reply(self, kind: PromptKind, text: impl Into<String>) -> Self {
        self.push(kind, ScriptedReply::Text(text.into()))
    }

    /// Queue a service failure for the next prompt of this kind.
    pub fn fail(self, kind: PromptKind, message: impl Into<String>) -> Self {
        self.push(kind, ScriptedReply::Fail(message.into()))
    }

    /// Queue a reply that never arrives.
    pub fn stall(self, kind: PromptKind) -> Self {
        self.push(kind, ScriptedReply::Stall)
    }

    /// Fallback reply once the queue for this kind is drained.
    pub fn always(self, kind: PromptKind, text: impl Into<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.always.insert(kind, ScriptedReply::Text(text.into()));
        }
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.script
            .lock()
            .map(|s| s.calls.iter().map(|(_, p)| p.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of prompts received for one kind.
    pub fn calls_for(&self, kind: PromptKind) -> usize {
        self.script
            .lock()
            .map(|s| s.calls.iter().filter(|(k, _)| *k == Some(kind)).count())
            .unwrap_or_default()
    }

    fn next_reply(&self, prompt: &str) -> Result<ScriptedReply, GeneratorError> {
        let kind = PromptKind::from_tagged(prompt);
        let mut script = self
            .script
            .lock()
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;
        script.calls.push((kind, prompt.to_string()));

        let kind = kind.ok_or_else(|| GeneratorError::InvalidResponse("prompt carries no kind tag".to_string()))?;
        if let Some(reply) = script.queued.get_mut(&kind).and_then(|q| q.pop_front()) {
            return Ok(reply);
        }
        script
            .always
            .get(&kind)
            .cloned()
            .ok_or_else(|| GeneratorError::InvalidResponse(format!("no scripted reply for {}", kind)))
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        match self.next_reply(prompt)? {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Fail(message) => Err(GeneratorError::Api { status: 503, message }),
            ScriptedReply::Stall => std::future::pending().await,
        }
    }
}

/// Validator reply in the wire format the pipeline parses.
pub fn verdict_json(success: bool, message: &str, guidance: &str) -> String {
    serde_json::json!({
        "feedback": { "success": success, "message": message },
        "validation_instructions": guidance,
    })
    .to_string()
}

/// Shorthand for an accepting validator reply.
pub fn accept(message: &str) -> String {
    verdict_json(true, message, "")
}

/// Shorthand for a rejecting validator reply carrying guidance.
pub fn reject(message: &str, guidance: &str) -> String {
    verdict_json(false, message, guidance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(kind: PromptKind, body: &str) -> String {
        format!("{}\n{}", kind.tag(), body)
    }

    #[tokio::test]
    async fn test_replies_in_order_per_kind() {
        let generator = ScriptedGenerator::new()
            .reply(PromptKind::RetrieveGoal, "first")
            .reply(PromptKind::RetrieveGoal, "second")
            .reply(PromptKind::ValidateGoal, "verdict");

        assert_eq!(generator.generate(&tagged(PromptKind::ValidateGoal, "x")).await.unwrap(), "verdict");
        assert_eq!(generator.generate(&tagged(PromptKind::RetrieveGoal, "x")).await.unwrap(), "first");
        assert_eq!(generator.generate(&tagged(PromptKind::RetrieveGoal, "x")).await.unwrap(), "second");
        assert_eq!(generator.calls_for(PromptKind::RetrieveGoal), 2);
        assert_eq!(generator.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_always_used_after_queue() {
        let generator = ScriptedGenerator::new()
            .reply(PromptKind::CreatePlan, "queued")
            .always(PromptKind::CreatePlan, "fallback");
        let prompt = tagged(PromptKind::CreatePlan, "");
        assert_eq!(generator.generate(&prompt).await.unwrap(), "queued");
        assert_eq!(generator.generate(&prompt).await.unwrap(), "fallback");
        assert_eq!(generator.generate(&prompt).await.unwrap(), "fallback");
    }

    #[tokio::test]
    async fn test_missing_reply_is_error() {
        let generator = ScriptedGenerator::new();
        let err = generator.generate(&tagged(PromptKind::AskUser, "")).await.unwrap_err();
        assert!(err.to_string().contains("no scripted reply for ask_user"));

        let err = generator.generate("untagged").await.unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_fail_reply() {
        let generator = ScriptedGenerator::new().fail(PromptKind::CreatePlan, "overloaded");
        let err = generator.generate(&tagged(PromptKind::CreatePlan, "")).await.unwrap_err();
        assert!(matches!(err, GeneratorError::Api { status: 503, .. }));
    }

    #[test]
    fn test_verdict_helpers() {
        let v: serde_json::Value = serde_json::from_str(&reject("too long", "shorten")).unwrap();
        assert_eq!(v["feedback"]["success"], false);
        assert_eq!(v["validation_instructions"], "shorten");
        let v: serde_json::Value = serde_json::from_str(&accept("fine")).unwrap();
        assert_eq!(v["feedback"]["success"], true);
    }
}
