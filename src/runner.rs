//! Check runner
//!
//! Drives one [`CouchDbCheck`] per configured instance, either once or on a
//! fixed interval until a shutdown signal arrives. Checks live as long as the
//! runner, so resolved versions and database blacklists carry over between
//! runs.

use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{error, info};

use crate::check::CouchDbCheck;
use crate::collector::CouchClient;
use crate::config::{Config, Instance};
use crate::emitter::{Aggregator, Formatter};

/// One configured instance and the check bound to it
pub struct Target {
    pub instance: Instance,
    pub check: CouchDbCheck,
}

/// Outcome of running a target once
pub struct RunReport {
    pub instance: String,
    pub output: Aggregator,
    pub error: Option<String>,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Build a target per configured instance, sharing one HTTP client
pub fn build_targets(config: &Config) -> Result<Vec<Target>> {
    let client = CouchClient::new()?;

    Ok(config
        .instances
        .iter()
        .map(|instance| Target {
            instance: instance.clone(),
            check: CouchDbCheck::with_client(client.clone()),
        })
        .collect())
}

/// Run every target once, sequentially
pub async fn run_once(targets: &mut [Target]) -> Vec<RunReport> {
    let mut reports = Vec::with_capacity(targets.len());

    for target in targets.iter_mut() {
        let mut output = Aggregator::new();
        let result = target.check.check(&target.instance, &mut output).await;

        let error = match result {
            Ok(()) => {
                info!(
                    instance = %target.instance.label(),
                    gauges = output.gauges.len(),
                    "Check run complete"
                );
                None
            }
            Err(e) => {
                error!(instance = %target.instance.label(), error = %e, "Check run failed");
                Some(e.to_string())
            }
        };

        reports.push(RunReport {
            instance: target.instance.label().to_string(),
            output,
            error,
        });
    }

    reports
}

fn print_reports(reports: &[RunReport], formatter: &Formatter) -> Result<()> {
    for report in reports {
        print!("{}", formatter.format(&report.output)?);
        if let Some(error) = &report.error {
            println!("# ERROR {} {}", report.instance, error);
        }
    }
    Ok(())
}

/// Run the configured checks
///
/// Without an interval every instance runs once and an error is returned if
/// any of them failed. With an interval, runs repeat until Ctrl+C / SIGTERM.
pub async fn run(config: Config, interval: Option<Duration>, formatter: Formatter) -> Result<()> {
    if let Some(version) = &config.init_config.version {
        info!(version = %version, "Configured version hint (informational)");
    }

    let mut targets = build_targets(&config)?;

    let Some(period) = interval else {
        let reports = run_once(&mut targets).await;
        print_reports(&reports, &formatter)?;

        let failed = reports.iter().filter(|r| !r.is_ok()).count();
        if failed > 0 {
            anyhow::bail!("{} of {} instance(s) failed", failed, reports.len());
        }
        return Ok(());
    };

    info!(interval_secs = period.as_secs(), "Running checks on an interval");
    let mut ticker = schedule(period);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reports = run_once(&mut targets).await;
                print_reports(&reports, &formatter)?;
            }
            _ = &mut shutdown => break,
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Run ticker for interval mode
///
/// A run that overruns the period delays the next one instead of triggering
/// back-to-back catch-up runs.
fn schedule(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
