use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use ecoshim::config::Config;
use ecoshim::dispatch::{Dispatcher, ToolRegistry};
use ecoshim::ipc::Server;
use ecoshim::ledger::{Ledger, OperationRecord};

mod cli;

use cli::{Cli, Commands};

fn setup_logging(cli: &Cli, config: &Config) -> Result<()> {
    // stdout belongs to the JSON Lines transport, so logs go to a file
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ecoshim")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("ecoshim.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_filter = if cli.is_verbose() {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };

    env_logger::Builder::new()
        .parse_filters(default_filter)
        .parse_env(env_logger::Env::default())
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_ledger(config: &Config) -> Result<Ledger> {
    let path = &config.ledger.db_path;
    let ledger = Ledger::open(path)
        .context(format!("Failed to open ledger at {}", path.display()))?
        .with_max_result_chars(config.ledger.max_result_chars);
    Ok(ledger)
}

fn build_dispatcher(config: Config) -> Result<Dispatcher> {
    let ledger = Arc::new(open_ledger(&config)?);
    let policy = config.ledger.on_write_failure;
    let registry = ToolRegistry::standard(Arc::new(config));
    Ok(Dispatcher::new(registry, ledger, policy))
}

async fn run_application(cli: Cli, config: Config) -> Result<()> {
    info!("Starting application");

    match cli.command {
        Commands::Serve => handle_serve(config).await,
        Commands::Tools => handle_tools(config),
        Commands::Call { tool, params } => handle_call(&tool, &params, config).await,
        Commands::History { limit, tool } => handle_history(limit, tool.as_deref(), &config),
        Commands::Purge { all, before, yes } => handle_purge(all, before.as_deref(), yes, &config),
    }
}

async fn handle_serve(config: Config) -> Result<()> {
    let dispatcher = Arc::new(build_dispatcher(config)?);
    Server::new(dispatcher)
        .serve_stdio()
        .await
        .context("stdio server failed")?;
    Ok(())
}

fn handle_tools(config: Config) -> Result<()> {
    let registry = ToolRegistry::standard(Arc::new(config));
    for def in registry.definitions() {
        println!("{}", def.name.bold());
        println!("  {}", def.description);
    }
    Ok(())
}

async fn handle_call(tool: &str, params: &str, config: Config) -> Result<()> {
    let parameters: Value = serde_json::from_str(params).context("--params is not valid JSON")?;
    let dispatcher = build_dispatcher(config)?;

    let response = dispatcher.dispatch(tool, parameters).await?;

    let status = if response.success {
        "success".green()
    } else {
        "failed".red()
    };
    eprintln!("{} {} in {}ms", tool.bold(), status, response.duration_ms);
    if let Some(err) = &response.ledger_error {
        eprintln!("{} {}", "Not recorded:".yellow(), err);
    }
    println!("{}", serde_json::to_string_pretty(&response.result)?);
    Ok(())
}

fn print_record(record: &OperationRecord) {
    let mark = if record.success { "ok".green() } else { "FAIL".red() };
    println!(
        "{:>6}  {}  {:<28} {:>4}  {}ms",
        record.id,
        record.timestamp.dimmed(),
        record.tool_name,
        mark,
        record.duration_ms
    );
}

fn handle_history(limit: usize, tool: Option<&str>, config: &Config) -> Result<()> {
    let ledger = open_ledger(config)?;
    let records = match tool {
        Some(name) => ledger.query_tool(name, limit)?,
        None => ledger.query(limit)?,
    };

    if records.is_empty() {
        println!("{}", "No operations recorded".yellow());
    }
    for record in &records {
        print_record(record);
    }

    ledger.close()?;
    Ok(())
}

fn handle_purge(all: bool, before: Option<&str>, yes: bool, config: &Config) -> Result<()> {
    if !yes {
        eyre::bail!("purge deletes history permanently; re-run with --yes to confirm");
    }

    let ledger = open_ledger(config)?;
    let removed = match before {
        Some(ts) => {
            let cutoff = DateTime::parse_from_rfc3339(ts)
                .context(format!("--before is not an RFC 3339 timestamp: {}", ts))?
                .with_timezone(&Utc);
            ledger.purge_before(cutoff)?
        }
        None if all => ledger.purge_all()?,
        None => eyre::bail!("pass --all or --before"),
    };

    println!("{} {} records", "Purged".red(), removed);
    ledger.close()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&cli, &config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(cli, config).await.context("Application failed")?;

    Ok(())
}
