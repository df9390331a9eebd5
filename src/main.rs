use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::{LevelFilter, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;
use deusflow::generator::HttpGenerator;
use deusflow::human::ConsoleHuman;
use deusflow::pipeline::{Services, Session, SessionReport};
use deusflow::prompt::{PromptCatalog, PromptKind};
use deusflow::tools::{CommandExecutor, StaticToolCatalog};

/// `debug: true` in the config raises the default level; `RUST_LOG` still wins.
fn log_level(config: &Config) -> LevelFilter {
    if config.debug { LevelFilter::Debug } else { LevelFilter::Info }
}

fn setup_logging(level: LevelFilter) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deusflow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("deusflow.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::new()
        .filter_level(level)
        .parse_env(env_logger::Env::default())
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            query,
            trail,
            json,
            max_attempts,
        } => {
            let mut config = config.clone();
            if let Some(n) = max_attempts {
                config.session.max_attempts = *n;
            }
            handle_run_command(query, trail.as_deref(), *json, &config)
        }
        Commands::Prompts { kind } => handle_prompts_command(kind.as_deref(), config),
        Commands::Tools => handle_tools_command(config),
    }
}

fn load_prompts(config: &Config) -> Result<PromptCatalog> {
    let catalog = match &config.prompts {
        Some(path) => PromptCatalog::from_yaml_file(path)
            .context(format!("Failed to load prompts from {}", path.display()))?,
        None => PromptCatalog::builtin()?,
    };
    Ok(catalog)
}

fn load_tools(config: &Config) -> Result<StaticToolCatalog> {
    match &config.tools {
        Some(path) => {
            StaticToolCatalog::from_file(path).context(format!("Failed to load tools from {}", path.display()))
        }
        None => {
            warn!("No tool catalog configured");
            Ok(StaticToolCatalog::new(Vec::new()))
        }
    }
}

fn handle_run_command(query: &str, trail: Option<&Path>, json: bool, config: &Config) -> Result<()> {
    info!("Running session for: {}", query);
    let generator = HttpGenerator::new(config.generator.clone()).context("Failed to create generator")?;
    let prompts = load_prompts(config)?;
    let tools = load_tools(config)?;
    if tools.is_empty() {
        println!("{}", "Warning: tool catalog is empty, no step can be executed".yellow());
    }

    let cancel = CancellationToken::new();
    let services = Arc::new(Services::with_cancel(
        Arc::new(generator),
        prompts,
        Arc::new(tools),
        Arc::new(CommandExecutor::new(config.session.tool_timeout())),
        Arc::new(ConsoleHuman),
        config.session.clone(),
        cancel.clone(),
    ));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let report = runtime.block_on(async {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling session");
                interrupt.cancel();
            }
        });
        Session::new(query, services).run().await
    })?;

    let trail = trail.map(Path::to_path_buf).or_else(|| {
        config
            .trail_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.jsonl", report.workflow_id)))
    });
    if let Some(path) = trail {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create trail directory")?;
        }
        report.logger.write_jsonl(&path)?;
        println!("{} {}", "Trail written to".cyan(), path.display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report.context)?);
    } else {
        print_report(&report);
    }

    if report.finished() {
        Ok(())
    } else {
        Err(eyre!("Session did not finish"))
    }
}

fn print_report(report: &SessionReport) {
    let scope = &report.context.scope;
    if let Some(goal) = &scope.user_goal {
        println!("{} {}", "Goal:".green(), goal);
    }
    for requirement in &scope.requirements {
        println!("  - {}", requirement);
    }
    if let Some(plan) = &report.context.plan {
        println!("{}", "Plan:".green());
        println!("{}", plan);
    }
    println!("{} {}", "Iterations:".cyan(), report.logger.len());

    match report.last_feedback() {
        Some(feedback) if report.finished() => println!("{} {}", "Finished:".green(), feedback.message()),
        Some(feedback) => println!("{} {}", "Stopped:".red(), feedback.message()),
        None => println!("{}", "Stopped without feedback".red()),
    }
}

fn handle_prompts_command(kind: Option<&str>, config: &Config) -> Result<()> {
    match kind {
        None => {
            for kind in PromptKind::all() {
                println!("{}", kind);
            }
        }
        Some(name) => {
            let kind = PromptKind::parse(name).ok_or_else(|| eyre!("Unknown prompt kind: {}", name))?;
            let prompts = load_prompts(config)?;
            println!("{}", prompts.template(kind));
        }
    }
    Ok(())
}

fn handle_tools_command(config: &Config) -> Result<()> {
    let tools = load_tools(config)?;
    for tool in tools.tools() {
        println!("{} {}", tool.name.green(), tool.description);
        if !tool.input_format.is_empty() {
            println!("    input: {}", tool.input_format);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration; it decides the log level
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(log_level(&config)).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
