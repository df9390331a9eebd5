//! Refine loop - generate, validate, refine until accepted
//!
//! This module provides:
//! - The Producer and Validator seams
//! - RefineLoop: the bounded retry driver shared by every decision point
//! - Generator-backed producers and validators built from prompt kinds

pub mod prompted;
pub mod refine_loop;
pub mod traits;

pub use prompted::{Gateway, PromptedProducer, PromptedValidator, merge_vars, reject_locally};
pub use refine_loop::{RefineLoop, Refined};
pub use traits::{Producer, Production, Review, Validator};
