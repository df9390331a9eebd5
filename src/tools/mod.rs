//! Tool System - candidate lookup and execution
//!
//! Both are boundaries: the pipeline only sees the [`ToolCatalog`] and
//! [`ToolExecutor`] traits.

mod catalog;
mod executor;

pub use catalog::{StaticToolCatalog, ToolCatalog};
pub use executor::{CommandExecutor, Execution, ScriptedExecutor, TOOL_INPUT_ENV, ToolExecutor};
