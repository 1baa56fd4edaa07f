use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

use mcp_service_management::{
    check_status, ExitReason, Health, ProcessFileStore, RunObserver, ServiceRegistry,
    ShutdownReport, SignalBridge, StartupReport, Supervisor, SupervisorConfig, SupervisorSettings,
};

/// MCP Service Manager - launches and supervises the agent tool servers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML); the built-in tool table is used without one
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Project root (overrides config; defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    project_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Launch every service and supervise until interrupted or one crashes
    Run,
    /// Probe the services recorded by a running supervisor, then exit
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let env_file = dotenv::dotenv().ok();
    let config = SupervisorConfig::load(args.config.as_deref())?;

    initialize_logging(args.debug, &config.supervisor.log_level)?;
    if let Some(path) = env_file {
        debug!("Loaded environment from {}", path.display());
    }

    let project_root = config.resolve_project_root(args.project_root.as_deref())?;
    let settings = SupervisorSettings::from_options(&config.supervisor, &project_root);
    info!("Project root: {}", project_root.display());

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, settings).await,
        Command::Status => status(&config, settings).await,
    }
}

fn initialize_logging(debug: bool, configured_level: &str) -> Result<()> {
    let level = if debug { "debug" } else { configured_level };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

async fn run(config: &SupervisorConfig, settings: SupervisorSettings) -> Result<ExitCode> {
    print_banner(config);

    let load = ServiceRegistry::load(config.service_specs(), &settings.project_root)
        .context("Invalid service registry")?;
    for rejected in &load.rejected {
        println!("⚠️  Skipping {}: {}", rejected.service_id(), rejected);
    }
    if load.registry.is_empty() {
        warn!("No launchable services; waiting for a shutdown signal");
    }

    let bridge = SignalBridge::install().context("Failed to install signal handlers")?;
    let token = bridge.token();

    let mut supervisor = Supervisor::new(load.registry, settings);
    let (reason, report) = supervisor.run(&token, &ConsoleReporter).await?;

    Ok(ExitCode::from(reason.exit_code(&report)))
}

async fn status(config: &SupervisorConfig, settings: SupervisorSettings) -> Result<ExitCode> {
    let specs: Vec<_> = config.service_specs().into_iter().map(Arc::new).collect();
    let pid_files = ProcessFileStore::new(&settings.run_dir);

    let entries = check_status(&specs, &pid_files, &settings.health_probe()).await;
    println!("MCP service status:");
    for entry in &entries {
        println!("  {}", entry);
    }
    let up = entries.iter().filter(|e| e.status.is_up()).count();
    println!("{}/{} services up", up, entries.len());

    Ok(ExitCode::SUCCESS)
}

fn print_banner(config: &SupervisorConfig) {
    println!("🚀 Starting MCP services");
    println!("Port configuration:");
    for service in config.enabled_services() {
        println!("  {:<24} {}", service.display_name(), service.port);
    }
}

/// Prints the user-facing status lines on stdout as the run progresses.
struct ConsoleReporter;

impl RunObserver for ConsoleReporter {
    fn started(&self, supervisor: &Supervisor, startup: &StartupReport) {
        print_startup(supervisor, startup);
        if !startup.interrupted {
            println!("Press Ctrl+C to stop all services");
        }
    }

    fn stopping(&self, reason: &ExitReason) {
        match reason {
            ExitReason::ShutdownRequested => println!("\nStopping all services..."),
            ExitReason::ServiceCrashed(e) => println!("\n❌ {}; stopping all services...", e),
        }
    }

    fn stopped(&self, supervisor: &Supervisor, report: &ShutdownReport) {
        print_shutdown(supervisor, report);
    }
}

fn print_startup(supervisor: &Supervisor, startup: &StartupReport) {
    for failed in &startup.failed {
        println!("❌ {}", failed);
    }

    for (id, health) in &startup.health {
        let Some(handle) = supervisor.handle(id.as_str()) else {
            continue;
        };
        let name = &handle.spec().display_name;
        match health {
            Health::Healthy => println!("✅ {} is up on port {}", name, handle.port()),
            Health::Unreachable(_) => println!(
                "⚠️  {} is not answering on port {}; check {}",
                name,
                handle.port(),
                supervisor.settings().service_log_dir(id).display()
            ),
            Health::ProcessExited => println!("❌ {} exited during startup", name),
        }
    }

    if startup.launched.is_empty() {
        return;
    }

    println!();
    println!("Service information:");
    for service in &startup.launched {
        println!(
            "  {:<24} http://localhost:{:<5} (PID {})",
            service.display_name, service.port, service.pid
        );
    }
    println!("Logs: {}", supervisor.settings().log_dir.display());
    println!();
}

fn print_shutdown(supervisor: &Supervisor, report: &ShutdownReport) {
    for (id, outcome) in report.iter() {
        let name = supervisor
            .handle(id.as_str())
            .map(|h| h.spec().display_name.as_str())
            .unwrap_or(id.as_str());
        println!("  {:<24} {}", name, outcome);
    }
    if report.is_clean() {
        println!("✅ All services stopped");
    } else {
        println!("❌ Some services could not be stopped");
    }
}
