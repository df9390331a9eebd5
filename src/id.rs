//! ID generation utilities for deusflow
//!
//! Provides functions for generating identifiers for workflows, workflow
//! steps, plan steps and actions.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn random_suffix() -> u16 {
    rand::rng().random()
}

/// Generate a workflow ID
///
/// Format: `wf-{timestamp_ms}-{random_hex}`
pub fn generate_workflow_id() -> String {
    format!("wf-{}-{:04x}", now_ms(), random_suffix())
}

/// Generate a workflow step ID
///
/// Format: `wfs-{random_hex}`
pub fn generate_workflow_step_id() -> String {
    format!("wfs-{:04x}", random_suffix())
}

/// Generate a plan step ID
///
/// Format: `step-{timestamp_ms}-{random_hex}`
pub fn generate_step_id() -> String {
    format!("step-{}-{:04x}", now_ms(), random_suffix())
}

/// Generate an action ID scoped to its step
///
/// Format: `action-{step_suffix}-{random_hex}`
/// Example: for step "step-1738300800123-a1b2": "action-a1b2-9f3c"
pub fn generate_action_id(step_id: &str) -> String {
    let step_suffix = step_id.rsplit('-').next().unwrap_or(step_id);
    format!("action-{}-{:04x}", step_suffix, random_suffix())
}
