//! Periodic idle maintenance.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use dexuse_config::log_cli_info;
use dexuse_manager::MaintenanceReport;
use tracing::warn;

use crate::session::Session;

pub fn print_report(report: &MaintenanceReport) {
    println!(
        "Maintenance: {} package(s), {} stale record(s) removed, {} failed",
        report.packages,
        report.removed,
        report.failed.len()
    );
    for package in &report.failed {
        println!("  failed: {package}");
    }
}

/// Run maintenance every `interval` until interrupted, or once.
pub async fn run(session: &Session, interval: Duration, once: bool) -> Result<()> {
    if once {
        print_report(&session.manager.run_idle_maintenance());
        session.manager.flush();
        return Ok(());
    }

    log_cli_info!("Maintenance loop started", interval_secs = interval.as_secs());
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for ctrl-c");
        }
    };
    let passes = run_until(session, interval, ctrl_c).await;
    log_cli_info!("Interrupted, stopping maintenance loop", passes = passes);
    session.manager.flush();
    Ok(())
}

/// Run passes on every tick until `shutdown` completes. Returns the pass count.
///
/// `shutdown` stays registered across passes, so a signal that arrives while
/// a pass is running ends the loop once the pass returns.
async fn run_until<F: Future<Output = ()>>(
    session: &Session,
    interval: Duration,
    shutdown: F,
) -> usize {
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    let mut passes = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = tokio::task::block_in_place(|| session.manager.run_idle_maintenance());
                print_report(&report);
                passes += 1;
            }
            _ = &mut shutdown => break,
        }
    }
    passes
}
