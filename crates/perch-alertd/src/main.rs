//! perch-alertd - Perch alerting daemon
//!
//! Runs the alert rules engine against live system metrics and logs every
//! notification it would raise.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use perch_alertd::config::{DEFAULT_CONFIG_PATH, DaemonConfig};
use perch_alertd::rules::{export_default_rules, import_rules, read_rules_file};
use perch_alertd::{SysinfoSource, SystemMetricsPoller};
use perch_alerts::{AlertingSystem, BusHandle, InMemoryRuleRepository, LogNotifier, Notifier};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "perch-alertd")]
#[command(about = "Perch alerting daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the alerting daemon
    Run {
        /// Path to config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Print the built-in rules as JSON
    DefaultRules,

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("perch=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            run_daemon(config).await?;
        }

        Commands::DefaultRules => {
            println!("{}", export_default_rules()?);
        }

        Commands::InitConfig { output } => {
            init_config(&output)?;
        }
    }

    Ok(())
}

async fn run_daemon(config_path: PathBuf) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting perch-alertd");

    let config = DaemonConfig::from_file(&config_path)?;
    let repo = Arc::new(InMemoryRuleRepository::new());

    if let Some(rules_file) = &config.rules_file {
        let rules = read_rules_file(rules_file)?;
        let imported = import_rules(repo.as_ref(), rules).await?;
        info!(file = %rules_file.display(), imported, "loaded rules file");
    }

    let handle = BusHandle::new();
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::default());
    let system =
        AlertingSystem::start(repo, handle.clone(), Some(notifier), &config.alerting).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = config.poll_system_metrics.then(|| {
        let source = SysinfoSource::new(config.disk_mount_point.clone());
        let poller = SystemMetricsPoller::new(source, handle.clone(), config.poll_interval());
        tokio::spawn(poller.run(shutdown_rx))
    });

    info!(rules = system.engine.rule_count(), "perch-alertd running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Some(task) = poller {
        if let Err(e) = task.await {
            error!(error = %e, "metrics poller task failed");
        }
    }

    system.shutdown().await;
    info!("perch-alertd stopped");
    Ok(())
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    DaemonConfig::default().save(output)?;

    println!("Config written to {}", output.display());
    println!();
    println!("Edit the file to tune the alerting settings, then run:");
    println!("  perch-alertd run --config {}", output.display());

    Ok(())
}
