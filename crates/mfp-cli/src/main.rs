//! MFP CLI - host for the microfrontend messaging broker.
//!
//! # Commands
//!
//! - `mfp check`: loads the configuration and every manifest, then
//!   prints the registered applications
//! - `mfp serve`: runs the broker over a JSON-lines stdio transport
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`MFP_*`)
//! 3. Project config (`.mfp/config.toml` in the project root)
//! 4. Global config (`~/.mfp/config.toml`)
//! 5. Default values (lowest priority)
//!
//! Relative manifest paths resolve against the project root.

mod stdio;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mfp_message::Manifest;
use mfp_runtime::config::{ConfigLoader, PlatformConfig};
use mfp_runtime::platform::build_broker;
use mfp_runtime::{BrokerRunner, FileManifestLoader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// MFP CLI - microfrontend messaging broker
#[derive(Parser, Debug)]
#[command(name = "mfp")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root directory (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    /// Global config file (defaults to ~/.mfp/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load all manifests and print the registered applications
    Check,
    /// Run the broker over stdin/stdout
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Terminal filter: --debug > --verbose > RUST_LOG env > default "warn".
    // Logs go to stderr; stdout carries the transport.
    let filter = if args.debug {
        EnvFilter::new("debug,tokio=warn")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();

    let project_root = match &args.project {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = load_config(&args, &project_root)?;
    info!(path = %project_root.display(), apps = config.apps.len(), "Configuration loaded");

    let loader = FileManifestLoader::new(&project_root);
    match args.command {
        Command::Check => check(&config, &loader).await,
        Command::Serve => serve(&config, &loader).await,
    }
}

fn load_config(args: &Args, project_root: &std::path::Path) -> Result<PlatformConfig> {
    let mut loader = ConfigLoader::new().with_project_root(project_root);
    if let Some(path) = &args.config {
        loader = loader.with_global_config(path);
    }
    let mut config = loader.load().context("Config error")?;

    // CLI args override (highest priority)
    if args.debug {
        config.debug = true;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn check(config: &PlatformConfig, loader: &FileManifestLoader) -> Result<()> {
    let broker = build_broker(config, loader).await;
    let registry = broker.registry();

    let configured = config.active_apps().count();
    let registered = registry.applications().len().saturating_sub(1);
    println!("{registered}/{configured} application(s) registered");

    for application in registry.applications().get_applications() {
        if let Some(manifest) = registry.manifest(&application.symbolic_name) {
            print_manifest(&manifest, &application.origin);
        }
    }

    if registered < configured {
        anyhow::bail!("{} application(s) failed to load", configured - registered);
    }
    Ok(())
}

fn print_manifest(manifest: &Manifest, origin: &str) {
    println!();
    println!("{} ({}) at {origin}", manifest.symbolic_name, manifest.name);
    for capability in &manifest.capabilities {
        let visibility = if capability.private { "private" } else { "public" };
        println!(
            "  provides {} {} [{visibility}]",
            capability.kind, capability.qualifier
        );
    }
    for intention in &manifest.intentions {
        println!("  intends  {} {}", intention.kind, intention.qualifier);
    }
}

async fn serve(config: &PlatformConfig, loader: &FileManifestLoader) -> Result<()> {
    let broker = build_broker(config, loader).await;
    let (transport, out_rx) = stdio::StdioTransport::new();
    let (inbox_tx, inbox_rx) = tokio::sync::mpsc::unbounded_channel();

    let (runner, handle) = BrokerRunner::new(broker, Arc::new(transport.clone()), inbox_rx);
    let broker_task = tokio::spawn(runner.run());
    let writer_task = tokio::spawn(stdio::write_stdout(out_rx));

    stdio::read_stdin(transport, inbox_tx).await;

    // EOF closes the inbox; the runner stops once it is drained and
    // the handle is gone
    drop(handle);
    let broker = broker_task.await.context("Broker task failed")?;
    info!(clients = broker.client_count(), "Broker stopped");

    // The writer drains once the last transport clone is gone
    let _ = writer_task.await;
    Ok(())
}
