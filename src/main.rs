//! # LedgerLens — scheduled business reports
//!
//! Usage:
//!   ledgerlens run                       # Poll for due reports until Ctrl-C
//!   ledgerlens process-now               # Run one cycle and exit
//!   ledgerlens process-report <id>       # Force one schedule entry
//!   ledgerlens status | metrics          # Operational surface
//!   ledgerlens cleanup                   # Sweep old artifacts
//!   ledgerlens seed schedules.toml       # Load templates and schedules

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledgerlens_core::config::expand_path;
use ledgerlens_core::{LedgerLensConfig, ReportStore, ReportTemplate, ScheduledReport};
use ledgerlens_delivery::Dispatcher;
use ledgerlens_render::{OutputDir, Renderer, cleanup_older_than};
use ledgerlens_scheduler::{
    DocumentAssembler, HttpMetricProvider, MetricRegistry, ReportScheduler, SchedulerSettings,
    SqliteStore,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ledgerlens",
    version,
    about = "📊 LedgerLens — scheduled PDF/XLSX business reports"
)]
struct Cli {
    /// Config file (default: ~/.ledgerlens/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON logs and JSON command output
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the poller and run until interrupted
    Run,
    /// Process every due report once
    ProcessNow,
    /// Generate and deliver one report regardless of its due date
    ProcessReport {
        /// Schedule entry id
        id: String,
    },
    /// Show scheduler status and schedule counts
    Status,
    /// Show today's generation metrics
    Metrics,
    /// Delete artifacts older than the configured retention
    Cleanup,
    /// Load templates and schedules from a TOML file
    Seed {
        file: PathBuf,
    },
}

/// Contents of a `seed` file.
#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    templates: Vec<ReportTemplate>,
    #[serde(default)]
    schedules: Vec<ScheduledReport>,
}

#[derive(Serialize)]
struct SeedSummary {
    templates: usize,
    schedules: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "ledgerlens=debug,ledgerlens_core=debug,ledgerlens_render=debug,ledgerlens_delivery=debug,ledgerlens_scheduler=debug"
    } else {
        "ledgerlens=info,ledgerlens_render=info,ledgerlens_delivery=info,ledgerlens_scheduler=info"
    };
    // Logs go to stderr so `--json` results on stdout stay parseable.
    let logs = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        logs.json().init();
    } else {
        logs.init();
    }

    let config = match &cli.config {
        Some(path) => LedgerLensConfig::load_from(path),
        None => LedgerLensConfig::load(),
    }
    .context("loading configuration")?;

    let db_path = expand_path(&config.store.path);
    let store: Arc<dyn ReportStore> = Arc::new(
        SqliteStore::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?,
    );

    match cli.command {
        Command::Seed { file } => {
            let summary = seed(store.as_ref(), &file).await?;
            print(cli.json, &summary, || {
                format!(
                    "✅ Seeded {} template(s) and {} schedule(s)",
                    summary.templates, summary.schedules
                )
            })
        }
        Command::Cleanup => {
            let dir = expand_path(&config.output.dir);
            let max_age = Duration::from_secs(config.scheduler.cleanup_max_age_hours * 3600);
            let report = cleanup_older_than(&dir, max_age, SystemTime::now())?;
            print(cli.json, &report, || {
                format!(
                    "🧹 Removed {} file(s), kept {}, {} error(s)",
                    report.removed, report.kept, report.errors
                )
            })
        }
        command => {
            let scheduler = Arc::new(build_scheduler(&config, store)?);
            scheduler.initialize()?;
            match command {
                Command::Run => run(&config, scheduler).await,
                Command::ProcessNow => {
                    let stats = scheduler.process_now().await?;
                    print(cli.json, &stats, || {
                        format!(
                            "📣 Processed {} report(s): {} ok, {} failed ({}ms)",
                            stats.processed, stats.succeeded, stats.failed, stats.duration_ms
                        )
                    })
                }
                Command::ProcessReport { id } => {
                    let outcome = scheduler.process_specific_report(&id).await?;
                    print(cli.json, &outcome, || match &outcome.error {
                        None => format!(
                            "✅ {} delivered; next run {}",
                            outcome.report_name, outcome.next_run_date
                        ),
                        Some(e) => format!("❌ {} failed: {e}", outcome.report_name),
                    })
                }
                Command::Status => {
                    let status = scheduler.detailed_status().await?;
                    print(cli.json, &status, || {
                        format!(
                            "📋 {} active schedule(s), {} due now, {} upcoming",
                            status.active_schedules, status.due_now, status.upcoming
                        )
                    })
                }
                Command::Metrics => {
                    let metrics = scheduler.metrics().await?;
                    print(cli.json, &metrics, || {
                        format!(
                            "📊 {}: {} run(s), {:.1}% succeeded, avg {:.0}ms",
                            metrics.date,
                            metrics.today.total,
                            metrics.today.success_rate,
                            metrics.today.average_generation_ms
                        )
                    })
                }
                Command::Seed { .. } | Command::Cleanup => Ok(()),
            }
        }
    }
}

fn build_scheduler(config: &LedgerLensConfig, store: Arc<dyn ReportStore>) -> Result<ReportScheduler> {
    let provider = Arc::new(HttpMetricProvider::new(&config.provider));
    let assembler = DocumentAssembler::new(provider, Arc::new(MetricRegistry::with_builtins()));
    let renderer = Renderer::new(
        OutputDir::new(expand_path(&config.output.dir)),
        config.output.company_name.clone(),
    );
    let dispatcher = Dispatcher::from_config(config)?;
    Ok(ReportScheduler::new(
        store,
        assembler,
        renderer,
        dispatcher,
        SchedulerSettings::from(&config.scheduler),
    ))
}

async fn run(config: &LedgerLensConfig, scheduler: Arc<ReportScheduler>) -> Result<()> {
    println!("📊 LedgerLens v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Store:   {}", config.store.path);
    println!("   📂 Output:  {}", config.output.dir);
    println!("   🔌 Metrics: {}", config.provider.base_url);
    println!();

    scheduler.start()?;
    let cleanup = spawn_cleanup(config);

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Interrupt received, shutting down");
    cleanup.abort();
    scheduler.shutdown().await;
    Ok(())
}

/// Periodic artifact sweep alongside the poller.
fn spawn_cleanup(config: &LedgerLensConfig) -> tokio::task::JoinHandle<()> {
    let dir = expand_path(&config.output.dir);
    let max_age = Duration::from_secs(config.scheduler.cleanup_max_age_hours * 3600);
    let every = Duration::from_secs(config.scheduler.cleanup_interval_secs.max(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let dir = dir.clone();
            let swept =
                tokio::task::spawn_blocking(move || cleanup_older_than(&dir, max_age, SystemTime::now()))
                    .await;
            match swept {
                Ok(Ok(report)) if report.removed > 0 => {
                    tracing::info!("🧹 Removed {} old artifact(s)", report.removed)
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("⚠️ Artifact cleanup failed: {e}"),
                Err(e) => tracing::warn!("⚠️ Artifact cleanup task panicked: {e}"),
            }
        }
    })
}

async fn seed(store: &dyn ReportStore, file: &Path) -> Result<SeedSummary> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let seed: SeedFile =
        toml::from_str(&content).with_context(|| format!("parsing {}", file.display()))?;
    for template in &seed.templates {
        store.save_template(template).await?;
        tracing::info!("📝 Template {} ({})", template.id, template.name);
    }
    for schedule in &seed.schedules {
        if store.find_template(&schedule.template_id).await?.is_none() {
            anyhow::bail!(
                "schedule {} references unknown template {}",
                schedule.id,
                schedule.template_id
            );
        }
        store.save_schedule(schedule).await?;
        tracing::info!(
            "⏰ Schedule {} ({}, next run {})",
            schedule.id,
            schedule.frequency.as_str(),
            schedule.next_run_date
        );
    }
    Ok(SeedSummary {
        templates: seed.templates.len(),
        schedules: seed.schedules.len(),
    })
}

fn print<T: Serialize>(json: bool, value: &T, human: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}
