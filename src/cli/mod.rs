//! CLI argument parsing and command dispatch

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use surge_core::{ExecutionMode, InMemoryMetrics, JobKind, MetricsSink, RunConfig};
use surge_transports::{http_job, single_request_job};

#[derive(Parser, Debug)]
#[command(name = "surge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Keep target details (URLs, hosts, errors) out of the logs
    #[arg(long, global = true)]
    pub confidential: bool,

    /// Seconds between traffic summaries, 0 to disable
    #[arg(long, global = true, default_value_t = 10)]
    pub report_interval: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the configured job
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Send a single request and print the response as JSON
    Once {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Execute the selected command
    pub async fn run(self) -> Result<()> {
        match &self.command {
            Commands::Validate { config } => {
                let run = self.load(config)?;
                tracing::info!(job = %run.job.name, kind = ?run.job.kind, "Configuration is valid");
                Ok(())
            }
            Commands::Run { config } => {
                let run = self.load(config)?;
                match run.job.kind {
                    JobKind::Http => self.run_loop(run).await,
                    JobKind::HttpRequest => self.run_once(run).await,
                }
            }
            Commands::Once { config } => {
                let run = self.load(config)?;
                self.run_once(run).await
            }
        }
    }

    fn load(&self, path: &Path) -> Result<RunConfig> {
        let mut run = RunConfig::from_path(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display()))?;
        if self.confidential {
            run.global.mode = ExecutionMode::Confidential;
        }
        Ok(run)
    }

    async fn run_loop(&self, run: RunConfig) -> Result<()> {
        let cancel = shutdown_token();
        let metrics = Arc::new(InMemoryMetrics::new());

        let reporter = (self.report_interval > 0).then(|| {
            tokio::spawn(report(
                Arc::clone(&metrics),
                Duration::from_secs(self.report_interval),
                cancel.clone(),
            ))
        });

        let result = http_job(
            &run.job,
            &run.global,
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
            cancel.clone(),
        )
        .await;

        cancel.cancel();
        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }

        let stats = result.with_context(|| format!("Job {} failed", run.job.name))?;
        let summary = metrics.summary();
        tracing::info!(
            job = %run.job.name,
            iterations = stats.iterations,
            successes = stats.successes,
            failures = stats.failures,
            success = %format!("{:.1}%", stats.success_rate() * 100.0),
            attempted_bytes = summary.attempted_bytes,
            delivered_bytes = summary.delivered_bytes,
            delivery = %format!("{:.1}%", stats.delivery_ratio() * 100.0),
            rate = %format!("{:.1}/s", stats.iterations_per_second()),
            "Job finished"
        );
        Ok(())
    }

    async fn run_once(&self, run: RunConfig) -> Result<()> {
        let cancel = shutdown_token();
        let metrics: Arc<dyn MetricsSink> = Arc::new(InMemoryMetrics::new());

        let outcome = single_request_job(&run.job, &run.global, metrics, cancel)
            .await
            .with_context(|| format!("Job {} failed", run.job.name))?;

        if let Some(error) = &outcome.error {
            if run.global.mode.is_confidential() {
                tracing::warn!(job = %run.job.name, "Request failed");
            } else {
                tracing::warn!(job = %run.job.name, error = %error, "Request failed");
            }
        }

        let json = serde_json::to_string_pretty(&outcome).context("Failed to encode response")?;
        println!("{json}");
        Ok(())
    }
}

/// Token cancelled on Ctrl+C
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => tracing::info!("Interrupted, shutting down"),
                    Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl+C"),
                }
                token.cancel();
            }
        }
    });
    cancel
}

/// Log the traffic summary every `interval` until cancelled
async fn report(metrics: Arc<InMemoryMetrics>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                let summary = metrics.summary();
                tracing::info!(
                    attempted_bytes = summary.attempted_bytes,
                    delivered_bytes = summary.delivered_bytes,
                    successes = summary.successful_exchanges,
                    failures = summary.failed_exchanges,
                    delivery = %format!("{:.1}%", summary.delivery_ratio() * 100.0),
                    "Traffic"
                );
            }
        }
    }
}
