//! Prompt System - Template catalog and rendering
//!
//! Every decision point has a [`PromptKind`]; the [`PromptCatalog`] resolves
//! one Handlebars template per kind at session start and renders it with the
//! producer's or validator's variables.

mod catalog;
mod render;

pub use catalog::{PromptCatalog, PromptKind};
pub use render::PromptRenderer;
