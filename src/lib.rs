//! Deusflow - a self-correcting scope, plan and act pipeline
//!
//! Every value taken from the text generator goes through a
//! generate-validate-refine loop before the pipeline acts on it. A session
//! turns a free-form query into a goal and requirements, describes the
//! scope, plans steps, and binds each step to a tool from a catalog.

pub mod audit;
pub mod domain;
pub mod error;
pub mod feedback;
pub mod generator;
pub mod human;
pub mod id;
pub mod pipeline;
pub mod prompt;
pub mod refine;
pub mod tools;
pub mod workflow;

pub use error::{DeusError, Result};
