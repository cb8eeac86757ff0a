//! Main entry point for the rusty-gate CLI.
//!
//! Validates a command, asks for confirmation when it needs elevated
//! permissions, and runs it in the sandbox.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use rusty_gate::audit::TracingAuditSink;
use rusty_gate::config::GateConfig;
use rusty_gate::security::RuleStore;
use rusty_gate::utils::logger;
use rusty_gate::SecurityEngine;

#[derive(Parser)]
#[command(name = "rusty-gate", version, about = "Security gate for AI-suggested shell commands")]
struct Cli {
    /// Config file (defaults to ~/.rusty-gate/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a command and print the verdict as JSON
    Check { command: String },
    /// Validate, confirm if needed, and run a command in the sandbox
    Run {
        command: String,
        #[arg(long, default_value = "cli")]
        session: String,
        /// Wall-clock limit in seconds (defaults to the configured value)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the active whitelist rules as JSON
    Rules,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging before anything else
    logger::init_logging(&logger::default_log_dir());

    let cli = Cli::parse();
    let config = GateConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Check { command } => {
            // Checking needs neither a prompt nor a sandbox
            let mut offline = config.clone();
            offline.sandbox.enabled = false;
            let engine = SecurityEngine::from_config(&offline, Arc::new(TracingAuditSink)).await?;
            let verdict = engine.validate(&command);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(if verdict.is_valid { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Run {
            command,
            session,
            timeout,
        } => {
            let engine = Arc::new(SecurityEngine::from_config(&config, Arc::new(TracingAuditSink)).await?);
            run(engine, &command, session, timeout.unwrap_or(config.sandbox.default_timeout_seconds)).await
        }
        Command::Rules => {
            let rules = RuleStore::open(&config.rules_path).snapshot().rules();
            println!("{}", serde_json::to_string_pretty(&rules)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(engine: Arc<SecurityEngine>, command: &str, session: String, timeout: u64) -> Result<ExitCode> {
    let verdict = engine.validate(command);
    if !verdict.is_valid {
        eprintln!("Command blocked (risk: {}):", verdict.risk_assessment);
        for reason in &verdict.blocked_reasons {
            eprintln!("  - {}", reason);
        }
        if !verdict.suggested_alternatives.is_empty() {
            eprintln!("Consider instead:");
            for alt in &verdict.suggested_alternatives {
                eprintln!("  {}", alt);
            }
        }
        return Ok(ExitCode::FAILURE);
    }

    // Ctrl-C while the prompt is open denies the request
    let listener = engine.interrupt_handle().map(|handle| {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !handle.interrupt() {
                    warn!("Interrupt received with no pending confirmation");
                }
            }
        })
    });

    let approved = engine
        .confirm_async(command.to_string(), verdict.required_permissions.clone(), session)
        .await;
    if let Some(listener) = listener {
        listener.abort();
    }
    if !approved {
        eprintln!("Command was not approved.");
        return Ok(ExitCode::FAILURE);
    }

    // From here on Ctrl-C stops the container
    let cancel = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let result = engine.execute_sandboxed_until(command, timeout, cancel).await?;
    info!("Executed '{}' in sandbox: success={}", command, result.success);
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    Ok(if result.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
