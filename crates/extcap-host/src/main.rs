//! extcap-host - drive external capture helpers
//!
//! Lists helper interfaces, queries their capabilities and runs capture
//! sessions with one channel per interface.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use extcap_core::config::{ConfigLoader, HostConfig};
use extcap_core::Session;
use extcap_runner::{helper_candidates, DiscoveryReport, ExtcapHost, SessionManager};
use serde_json::json;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "extcap-host")]
#[command(version)]
#[command(about = "Discover and run external capture helpers", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "EXTCAP_HOST_CONFIG")]
    config: Option<PathBuf>,

    /// Helper directory (overrides configuration)
    #[arg(long, global = true)]
    helper_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the interfaces every helper advertises
    Interfaces,

    /// Show the link-layer types of an interface
    Dlts {
        #[arg(short, long)]
        interface: String,
    },

    /// Show the configuration arguments of an interface
    Config {
        #[arg(short, long)]
        interface: String,
    },

    /// Capture from one or more helper interfaces until Ctrl+C
    Capture {
        /// Interface to capture from (repeatable)
        #[arg(short, long = "interface", required = true)]
        interfaces: Vec<String>,

        /// Extra helper argument, `--key=value` or `--flag` (repeatable)
        #[arg(short, long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show paths, configuration and helper count
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.clone());
    if let Some(dir) = cli.helper_dir.clone() {
        config.helpers.directory = Some(dir);
    }

    // CLI verbose flag takes precedence over config
    let log_level = if cli.verbose > 0 {
        match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match config.host.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "error" => Level::ERROR,
            _ => Level::WARN,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let host = Arc::new(ExtcapHost::from_config(&config));

    match cli.command {
        Commands::Interfaces => interfaces_command(host, cli.format).await,
        Commands::Dlts { interface } => dlts_command(host, &interface, cli.format).await,
        Commands::Config { interface } => config_command(host, &interface, cli.format).await,
        Commands::Capture { interfaces, args } => capture_command(host, interfaces, args).await,
        Commands::Status => status_command(&host, &config, cli.format),
    }
}

/// Load configuration from file/env, with fallback to defaults
fn load_config(cli_path: Option<PathBuf>) -> HostConfig {
    let loader = ConfigLoader::new().with_cli_path(cli_path);
    match loader.load() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not set up yet
            eprintln!("Failed to load configuration: {}, using defaults", e);
            HostConfig::default()
        }
    }
}

/// Run discovery off the async runtime; helpers are invoked synchronously
async fn discover(host: Arc<ExtcapHost>) -> anyhow::Result<DiscoveryReport> {
    let report = tokio::task::spawn_blocking(move || host.discover()).await?;
    for failure in &report.failures {
        warn!("{}", failure);
    }
    Ok(report)
}

async fn interfaces_command(host: Arc<ExtcapHost>, format: OutputFormat) -> anyhow::Result<()> {
    let report = discover(host).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            if report.interfaces.is_empty() {
                println!("No helper interfaces found ({} helpers probed)", report.helpers_probed);
            }
            for record in &report.interfaces {
                println!(
                    "{:<24} {:<32} {}",
                    record.call,
                    record.display,
                    record.helper.display()
                );
            }
            for conflict in &report.conflicts {
                println!("ignored: {}", conflict);
            }
        }
    }
    Ok(())
}

async fn dlts_command(
    host: Arc<ExtcapHost>,
    interface: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    discover(host.clone()).await?;
    let name = interface.to_string();
    let caps = tokio::task::spawn_blocking(move || host.link_types(&name)).await??;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&caps)?),
        OutputFormat::Text => {
            println!("Interface {} (monitor mode: {})", interface, caps.can_set_rfmon);
            for dlt in &caps.link_types {
                println!("  {:>4}  {:<16} {}", dlt.dlt, dlt.name, dlt.description);
            }
        }
    }
    Ok(())
}

async fn config_command(
    host: Arc<ExtcapHost>,
    interface: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    discover(host.clone()).await?;
    let name = interface.to_string();
    let arguments = tokio::task::spawn_blocking(move || host.configuration(&name)).await??;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&arguments)?),
        OutputFormat::Text => {
            for arg in &arguments {
                println!("{:<20} {:<10} {}", arg.call, arg.kind, arg.display);
                for (key, value) in &arg.properties {
                    println!("    {} = {}", key, value);
                }
                for value in &arg.values {
                    let marker = if value.is_default { "*" } else { " " };
                    println!("    {} {:<16} {}", marker, value.value, value.display);
                }
            }
        }
    }
    Ok(())
}

async fn capture_command(
    host: Arc<ExtcapHost>,
    interfaces: Vec<String>,
    args: Vec<String>,
) -> anyhow::Result<()> {
    discover(host.clone()).await?;

    let mut session = Session::new();
    for name in &interfaces {
        let mut options = host
            .helper_options(name)
            .with_context(|| format!("cannot capture from {}", name))?;
        for arg in &args {
            options = match arg.split_once('=') {
                Some((key, value)) => options.with_arg(key, value),
                None => options.with_flag(arg.as_str()),
            };
        }
        session.push(options);
    }

    let manager = host.start_session(session)?;

    println!();
    println!("  extcap-host v{}", env!("CARGO_PKG_VERSION"));
    println!();
    for (index, state) in manager.states() {
        if let Some(entry) = manager.session().get(index) {
            let channel = entry
                .channel()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            let pid = entry.pid().map(|p| p.to_string()).unwrap_or_else(|| "-".into());
            println!("  {:<20} pid {:<8} {:<16} {}", entry.name(), pid, state, channel);
        }
    }
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    run_until_shutdown(manager, tokio::signal::ctrl_c()).await
}

/// Wait for `shutdown`, then tear the session down whatever the wait returned
async fn run_until_shutdown(
    mut manager: SessionManager,
    shutdown: impl Future<Output = std::io::Result<()>>,
) -> anyhow::Result<()> {
    let waited = shutdown.await;
    manager.stop()?;
    info!("Capture stopped");
    waited.context("waiting for Ctrl+C failed")?;
    Ok(())
}

fn status_command(
    host: &ExtcapHost,
    config: &HostConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let helpers = helper_candidates(host.helper_dir()).map(|c| c.len()).unwrap_or(0);
    let config_path = ConfigLoader::default_config_path();

    match format {
        OutputFormat::Json => {
            let status = json!({
                "version": env!("CARGO_PKG_VERSION"),
                "core_version": extcap_core::HOST_VERSION,
                "platform": format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
                "config_path": config_path,
                "helper_dir": host.helper_dir(),
                "helpers": helpers,
                "pipe_dir": config.pipes.resolved_directory(),
                "pipe_prefix": config.pipes.prefix,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Text => {
            println!();
            println!("extcap-host v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Core: v{}", extcap_core::HOST_VERSION);
            println!("Platform: {} {}", std::env::consts::OS, std::env::consts::ARCH);
            if let Some(path) = config_path {
                println!("Config file: {} (exists: {})", path.display(), path.exists());
            }
            println!("Helper directory: {}", host.helper_dir().display());
            println!("  Helpers found: {}", helpers);
            #[cfg(unix)]
            println!("Channel directory: {}", config.pipes.resolved_directory().display());
            #[cfg(target_os = "windows")]
            println!("Channel namespace: {}", extcap_pipe::named_pipe::PIPE_NAMESPACE);
            println!("Channel prefix: {}", config.pipes.prefix);
            println!();
        }
    }
    Ok(())
}
