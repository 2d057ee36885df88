//! Meshcheck CLI
//!
//! Run acceptance scenarios against a WiFi mesh testbed.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use meshcheck::api::{ApiState, start_api_server};
use meshcheck::config::Config;
use meshcheck::scenarios::{Scenario, registry::SCENARIOS, run_scenarios};

/// Meshcheck - acceptance scenarios for WiFi mesh testbeds
#[derive(Debug, Parser)]
#[command(name = "meshcheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run scenarios against a testbed
    Run {
        /// Path to testbed configuration file
        #[arg(short, long, default_value = "testbed.yaml")]
        config: String,

        /// Specific scenarios to run (comma-separated)
        #[arg(short, long)]
        scenarios: Option<String>,

        /// Start HTTP status API on this port
        #[arg(long)]
        api_port: Option<u16>,

        /// Keep running after scenarios complete (for API access)
        #[arg(long)]
        keep_alive: bool,
    },

    /// Generate a default configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "testbed.yaml")]
        output: String,
    },

    /// List available scenarios
    List,

    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "testbed.yaml")]
        config: String,
    },
}

fn setup_logging(verbose: bool, json: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.json);

    match cli.command {
        Commands::Run {
            config: config_path,
            scenarios,
            api_port,
            keep_alive,
        } => run(&config_path, scenarios.as_deref(), api_port, keep_alive).await,

        Commands::Init { output } => init_config(&output),

        Commands::List => {
            list_scenarios();
            Ok(())
        }

        Commands::Validate {
            config: config_path,
        } => validate_config(&config_path),
    }
}

/// Run scenarios against a testbed
async fn run(
    config_path: &str,
    filter: Option<&str>,
    api_port: Option<u16>,
    keep_alive: bool,
) -> Result<()> {
    tracing::info!(config = %config_path, "Loading configuration");

    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    let testbed = config
        .testbed
        .to_testbed()
        .context("Failed to create testbed")?;

    tracing::info!(
        testbed = %testbed.name,
        pods = testbed.pods().len(),
        clients = testbed.clients().count(),
        "Testbed configuration loaded"
    );

    let selected: Vec<Arc<dyn Scenario>> = if let Some(filter) = filter {
        filter
            .split(',')
            .filter_map(|name| {
                let name = name.trim();
                SCENARIOS.get(name).cloned().or_else(|| {
                    tracing::warn!(scenario = name, "Unknown scenario, skipping");
                    None
                })
            })
            .collect()
    } else {
        SCENARIOS
            .iter()
            .filter(|(name, _)| config.is_scenario_enabled(name))
            .map(|(_, scenario)| Arc::clone(scenario))
            .collect()
    };

    if selected.is_empty() {
        tracing::warn!("No scenarios to run");
        return Ok(());
    }

    let api_state = ApiState::new();

    if let Some(port) = api_port {
        let state = api_state.clone();
        tokio::spawn(async move {
            if let Err(e) = start_api_server(port, state).await {
                tracing::error!(error = %e, "API server error");
            }
        });
        // Give the server a moment to start
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    tracing::info!(
        count = selected.len(),
        scenarios = ?selected.iter().map(|s| s.name()).collect::<Vec<_>>(),
        "Running scenarios"
    );

    let reports = run_scenarios(&selected, Arc::new(testbed), &config, &api_state).await;
    let all_passed = reports.iter().all(|r| r.passed);
    api_state.finish();

    let failed = reports.iter().filter(|r| !r.passed).count();
    if all_passed {
        tracing::info!(variants = reports.len(), "All scenarios PASSED");
    } else {
        tracing::error!(variants = reports.len(), failed = failed, "Some scenarios FAILED");
    }

    if keep_alive && api_port.is_some() {
        tracing::info!("Keeping alive for API access. Press Ctrl+C to exit.");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
    }

    if all_passed {
        Ok(())
    } else {
        anyhow::bail!("{failed} of {} scenario variants FAILED", reports.len())
    }
}

/// Generate a default configuration file
fn init_config(output: &str) -> Result<()> {
    let config = Config::default_config();
    let yaml = config.to_yaml().context("Failed to serialize config")?;

    std::fs::write(output, &yaml).with_context(|| format!("Failed to write config to {output}"))?;

    tracing::info!(path = %output, "Configuration file created");
    println!("Created {output}");
    println!();
    println!("Edit the file to describe your testbed, then run:");
    println!("  meshcheck run --config {output}");

    Ok(())
}

fn list_scenarios() {
    println!("Available scenarios:");
    println!();

    for (name, scenario) in SCENARIOS.iter() {
        let variants: Vec<String> = scenario.variants().iter().map(|p| p.to_string()).collect();
        println!("  {name:26} - {}", scenario.description());
        println!("  {:26}   variants: {}", "", variants.join(", "));
    }

    println!();
    println!("Run specific scenarios with:");
    println!("  meshcheck run --scenarios wired_connection,switching_wan");
}

/// Validate a configuration file
fn validate_config(config_path: &str) -> Result<()> {
    tracing::info!(config = %config_path, "Validating configuration");

    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    println!("Configuration is valid!");
    println!();
    println!("Testbed: {} ({})", config.testbed.name, config.testbed.gateway_url);
    println!("Nodes: {}", config.testbed.nodes.len());
    for node in &config.testbed.nodes {
        let mgmt = if node.mgmt { "" } else { ", unmanaged" };
        println!("  - {} ({}, {}{mgmt})", node.name, node.id, node.role);
    }
    println!("Clients: {}", config.testbed.clients.len());
    for client in &config.testbed.clients {
        println!("  - {} ({}, {})", client.name, client.iface, client.mac);
    }

    println!();
    println!("Scenarios configured: {}", config.scenarios.len());
    for (name, scenario) in &config.scenarios {
        let status = if scenario.enabled { "enabled" } else { "disabled" };
        println!("  - {name}: {status}");
    }

    Ok(())
}
