//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: drive one query through scope, plan and task phases
//! - prompts: list prompt kinds, or print one rendered template
//! - tools: list the tool catalog

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Deusflow - a self-correcting scope, plan and act pipeline
#[derive(Parser, Debug)]
#[command(name = "deusflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a session for a free-form query
    Run {
        /// What you want done
        query: String,

        /// Write the iteration log as JSONL to this file
        #[arg(short, long)]
        trail: Option<PathBuf>,

        /// Print the final context as JSON
        #[arg(long)]
        json: bool,

        /// Override the refine loop attempt cap
        #[arg(short = 'n', long)]
        max_attempts: Option<u32>,
    },

    /// List prompt kinds, or show the template of one
    Prompts {
        /// Prompt kind to show, e.g. create_plan
        kind: Option<String>,
    },

    /// List the tools in the configured catalog
    Tools,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["deusflow"]).is_err());
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::try_parse_from(["deusflow", "run", "count words in a file"]).unwrap();
        match cli.command {
            Commands::Run {
                query,
                trail,
                json,
                max_attempts,
            } => {
                assert_eq!(query, "count words in a file");
                assert!(trail.is_none());
                assert!(!json);
                assert!(max_attempts.is_none());
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_run_with_options() {
        let cli = Cli::try_parse_from([
            "deusflow",
            "-v",
            "run",
            "build it",
            "--trail",
            "/tmp/trail.jsonl",
            "--json",
            "-n",
            "3",
        ])
        .unwrap();
        assert!(cli.is_verbose());
        match cli.command {
            Commands::Run {
                trail,
                json,
                max_attempts,
                ..
            } => {
                assert_eq!(trail, Some(PathBuf::from("/tmp/trail.jsonl")));
                assert!(json);
                assert_eq!(max_attempts, Some(3));
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_config_option_is_global() {
        let cli = Cli::try_parse_from(["deusflow", "tools", "-c", "/path/to/deusflow.yml"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/deusflow.yml")));
        assert!(matches!(cli.command, Commands::Tools));
    }

    #[test]
    fn test_prompts_command() {
        let cli = Cli::try_parse_from(["deusflow", "prompts", "create_plan"]).unwrap();
        match cli.command {
            Commands::Prompts { kind } => assert_eq!(kind.as_deref(), Some("create_plan")),
            _ => panic!("Expected prompts command"),
        }
    }

    #[test]
    fn test_help_works() {
        Cli::command().debug_assert();
    }
}
