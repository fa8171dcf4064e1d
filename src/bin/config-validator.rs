//! # Command Core Configuration Validator
//!
//! Command-line tool for validating command core configuration before an
//! exchange is started. Loads an optional file plus `COMMAND_CORE__*`
//! environment overrides and reports the effective settings.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use command_core::config::{CommandCoreConfig, ConfigManager};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate command core configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate every configuration section
    All,

    /// Validate a single section
    Component {
        /// Section name (exchange, macro_commands, logging)
        name: String,
    },

    /// Print the effective configuration as JSON
    Show,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Show) => show_config(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            eprintln!("❌ {:#}", e);
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<ConfigManager> {
    let manager = ConfigManager::load(cli.config.as_ref()).with_context(|| match &cli.config {
        Some(path) => format!("loading {}", path.display()),
        None => "loading environment configuration".to_string(),
    })?;
    Ok(manager)
}

fn validate_all(cli: &Cli) -> Result<()> {
    println!("🔧 Validating Command Core Configuration");
    let manager = load(cli)?;
    println!("Environment: {}", manager.environment());
    if let Some(path) = manager.source_path() {
        println!("Config File: {}", path.display());
    }
    println!();

    let config = manager.config();
    report_exchange(config);
    report_macro_commands(config);
    report_logging(config);

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, name: &str) -> Result<()> {
    println!("🔧 Validating Component: {}", name);
    let manager = load(cli)?;
    let config = manager.config();

    match name.to_lowercase().replace('-', "_").as_str() {
        "exchange" => report_exchange(config),
        "macro_commands" | "macro" => report_macro_commands(config),
        "logging" => report_logging(config),
        _ => bail!("Unknown component: {}", name),
    }

    println!("✅ Component '{}' validation passed!", name);
    Ok(())
}

fn show_config(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    let effective = manager.debug_config()?;
    println!("{}", serde_json::to_string_pretty(&effective)?);
    Ok(())
}

fn report_exchange(config: &CommandCoreConfig) {
    let exchange = &config.exchange;
    println!("📬 Exchange");
    println!(
        "   ✅ Queues: requests {}, responses {}",
        exchange.request_queue_capacity, exchange.response_queue_capacity
    );
    println!("   ✅ Dispatch workers: {}", exchange.dispatch_workers);
    println!(
        "   ✅ Start timeout: {:?}, shutdown timeout: {:?}",
        exchange.start_timeout(),
        exchange.shutdown_timeout()
    );
    match exchange.completion_timeout() {
        Some(timeout) => println!("   ✅ Completion timeout: {:?}", timeout),
        None => println!("   ℹ️  Completion timeout disabled (callers wait indefinitely)"),
    }
}

fn report_macro_commands(config: &CommandCoreConfig) {
    let macros = &config.macro_commands;
    println!("🧩 Macro Commands");
    println!("   ✅ Max parallel workers: {}", macros.max_parallel_workers);
    println!("   ✅ Shutdown timeout: {:?}", macros.shutdown_timeout());
}

fn report_logging(config: &CommandCoreConfig) {
    let logging = &config.logging;
    println!("📝 Logging");
    match &logging.level {
        Some(level) => println!("   ✅ Level: {}", level),
        None => println!("   ℹ️  Level from RUST_LOG or environment default"),
    }
    println!("   ✅ JSON output: {}", logging.json);
}
