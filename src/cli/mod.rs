//! CLI module for deusflow - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running a session
//! and inspecting the prompt and tool catalogs.

pub mod commands;

pub use commands::Cli;
