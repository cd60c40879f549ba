//! Idle maintenance pass over every package with secondary dex usage.

use dexuse_config::log_manager_info;

use crate::manager::DexManager;
use crate::settings::{CompileReason, CompilerTarget};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub packages: usize,
    pub removed: usize,
    /// Packages with at least one failed optimization
    pub failed: Vec<String>,
}

impl DexManager {
    /// Reconcile, then compile with the background reason, each package that
    /// has secondary dex records.
    pub fn run_idle_maintenance(&self) -> MaintenanceReport {
        let target = CompilerTarget::Reason(CompileReason::BgDexopt);
        let mut report = MaintenanceReport::default();

        for package in self.packages_with_secondary_dex() {
            report.removed += self.reconcile_secondary_dex_files(&package).removed;
            if !self.dexopt_secondary_dex(&package, &target, false, false) {
                report.failed.push(package);
            }
            report.packages += 1;
        }

        log_manager_info!(
            "Idle maintenance finished",
            packages = report.packages,
            removed = report.removed,
            failed = report.failed.len()
        );
        report
    }
}
