//! Pipeline - the scope, plan and task phases of one session
//!
//! This module provides:
//! - Session limits and timeouts
//! - The session state machine, expressed as a workflow
//! - Scope gathering with a human in the loop
//! - Plan creation and revision
//! - Tool selection, action formulation and execution for one step

pub mod config;
mod planning;
mod scope;
pub mod session;
mod task;

pub use config::SessionConfig;
pub use session::{ESTABLISH_SCOPE, PLANNING, Services, Session, SessionReport, TASK_HANDLING};
pub use task::{ActionDraft, ToolChoice};
