//! Generator boundary - the fallible text generation service
//!
//! This module provides:
//! - The Generator trait and its timeout/cancellation handle
//! - An HTTP adapter for a messages-style completion API
//! - A scripted generator for tests and dry runs
//! - Parsing helpers for the JSON objects embedded in responses

pub mod client;
pub mod http;
pub mod parse;
pub mod scripted;

pub use client::{Generator, GeneratorError, GeneratorHandle, bounded};
pub use http::{HttpGenerator, HttpGeneratorConfig};
pub use parse::{
    PlanEntry, extract_json, parse_feedback, parse_guidance, parse_plan_entries, parse_string_list, parse_success,
    parse_text,
};
pub use scripted::{ScriptedGenerator, ScriptedReply, accept, reject, verdict_json};
