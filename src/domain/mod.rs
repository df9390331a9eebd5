//! Domain types for deusflow
//!
//! This module contains the task model the pipeline populates:
//! - Scope: goal, requirements and description for one user query
//! - Plan / Step: ordered work with one-way progress
//! - Tool / Action: catalog entries and the concrete invocations bound to them
//! - Context: the session state tying them together
//!
//! Domain values change only when a refine loop has fully succeeded.

pub mod action;
pub mod context;
pub mod plan;
pub mod scope;
pub mod tool;

pub use action::Action;
pub use context::{Context, Phase};
pub use plan::{Plan, Step};
pub use scope::{Scope, covers, merge_verbatim, normalize_requirement};
pub use tool::Tool;
