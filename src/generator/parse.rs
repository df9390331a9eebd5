//! Response parsing for generator output
//!
//! Generator text is expected to hold one JSON object, possibly wrapped in
//! prose or code fences. These helpers locate that object and pull the
//! well-known keys out of it.

use serde_json::Value;

use crate::error::{DeusError, Result};
use crate::feedback::Feedback;

/// Locate and decode the top-level JSON object in a generator response.
///
/// Tries the trimmed text first, then the span from the first `{` to the
/// last `}`.
pub fn extract_json(field: &str, response: &str) -> Result<Value> {
    let trimmed = response.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err(DeusError::malformed(field, "no JSON object in response"));
    };
    if end < start {
        return Err(DeusError::malformed(field, "no JSON object in response"));
    }

    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(DeusError::malformed(field, "response is not a JSON object")),
        Err(e) => Err(DeusError::malformed(field, format!("invalid JSON: {}", e))),
    }
}

/// Lenient boolean: accepts JSON booleans and the usual truthy strings.
pub fn parse_success(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "success" | "yes" | "y" | "pass" => Some(true),
            "false" | "f" | "failure" | "fail" | "no" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// `{"feedback": {"success": bool, "message": string}}`
pub fn parse_feedback(json: &Value) -> Option<Feedback> {
    let feedback = json.get("feedback")?;
    let success = parse_success(feedback.get("success")?)?;
    let message = feedback
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(Feedback::new(message, success))
}

/// `validation_instructions`, empty when absent.
pub fn parse_guidance(json: &Value) -> String {
    json.get("validation_instructions")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// A non-empty string under `key`.
pub fn parse_text(json: &Value, key: &str) -> Option<String> {
    json.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A list of strings under `key`. A bare string counts as a one-item list;
/// blank items are dropped.
pub fn parse_string_list(json: &Value, key: &str) -> Option<Vec<String>> {
    match json.get(key)? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Value::String(s) if !s.trim().is_empty() => Some(vec![s.trim().to_string()]),
        _ => None,
    }
}

/// One step as the planner wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub name: String,
    pub goal: String,
    pub blocked_by: Vec<String>,
}

/// `{"plan": {"step_1": "goal", "step_2": {"goal": "...", "blocked_by": ["step_1"]}}}`
///
/// An array of `{"name", "goal"}` objects is accepted too. Object order is
/// the step order.
pub fn parse_plan_entries(json: &Value) -> Option<Vec<PlanEntry>> {
    match json.get("plan")? {
        Value::Object(map) => map
            .iter()
            .map(|(name, body)| plan_entry(name, body))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let name = item
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("step_{}", i + 1));
                plan_entry(&name, item)
            })
            .collect(),
        _ => None,
    }
}

fn plan_entry(name: &str, body: &Value) -> Option<PlanEntry> {
    let (goal, blocked_by) = match body {
        Value::String(goal) => (goal.trim().to_string(), Vec::new()),
        Value::Object(_) => {
            let goal = body
                .get("goal")
                .or_else(|| body.get("description"))
                .and_then(Value::as_str)?
                .trim()
                .to_string();
            (goal, parse_string_list(body, "blocked_by").unwrap_or_default())
        }
        _ => return None,
    };
    if goal.is_empty() {
        return None;
    }
    Some(PlanEntry {
        name: name.to_string(),
        goal,
        blocked_by,
    })
}
