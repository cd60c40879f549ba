//! Drops ledger entries for secondary dex files deleted behind our back.

use std::collections::BTreeSet;

use dexuse_config::{log_manager_debug, log_manager_error};
use dexuse_index::{path_is_under, PackageInfo};

use crate::collaborators::{ArtifactCleanup, StorageKind};
use crate::manager::DexManager;

/// Result of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Secondary records looked at
    pub examined: usize,
    /// Records dropped from the ledger
    pub removed: usize,
}

fn storage_kind(app: &PackageInfo, dex_path: &str) -> Option<StorageKind> {
    let under = |dir: &Option<String>| dir.as_deref().is_some_and(|d| path_is_under(d, dex_path));
    if under(&app.device_protected_data_dir) {
        Some(StorageKind::DeviceProtected)
    } else if under(&app.credential_protected_data_dir) {
        Some(StorageKind::CredentialProtected)
    } else {
        None
    }
}

impl DexManager {
    /// Check every secondary dex recorded for `package` against the file
    /// system. Missing files lose their record and their generated artifacts.
    ///
    /// Only an explicit "missing" answer from the helper removes a record; a
    /// helper error keeps it.
    pub fn reconcile_secondary_dex_files(&self, package: &str) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let Some(usage) = self.package_use_info(package) else {
            log_manager_debug!("Nothing to reconcile", package = package);
            return report;
        };

        let ledger = self.store.ledger();
        let mut removed: BTreeSet<&str> = BTreeSet::new();

        for (dex_path, record) in usage.secondary_dex_files() {
            report.examined += 1;
            let user = record.owner_user_id;

            let app = match self.collaborators.authority.installed_package(package, user) {
                Ok(Some(app)) => app,
                Ok(None) => {
                    log_manager_debug!("Package gone for user", package = package, user = user);
                    if ledger.remove_user_package(package, user) {
                        removed.extend(
                            usage
                                .secondary_dex_files()
                                .filter(|(_, r)| r.owner_user_id == user)
                                .map(|(p, _)| p.as_str()),
                        );
                    }
                    continue;
                }
                Err(e) => {
                    log_manager_error!(
                        "Package lookup failed during reconcile",
                        package = package,
                        user = user,
                        error = tracing::field::display(&e)
                    );
                    continue;
                }
            };

            let Some(storage) = storage_kind(&app, dex_path) else {
                log_manager_error!("Could not infer storage for dex", path = dex_path.as_str());
                if ledger.remove_dex_file(package, dex_path, user) {
                    removed.insert(dex_path.as_str());
                }
                continue;
            };

            let request = ArtifactCleanup {
                dex_path: dex_path.clone(),
                package_name: package.to_string(),
                uid: app.uid,
                isas: record.loader_isas.iter().cloned().collect(),
                volume_uuid: app.volume_uuid.clone(),
                storage,
            };
            let still_exists = {
                let _guard = self.install_lock.lock();
                match self.collaborators.helper.delete_generated_artifacts(&request) {
                    Ok(exists) => exists,
                    Err(e) => {
                        log_manager_error!(
                            "Helper failed to reconcile dex",
                            path = dex_path.as_str(),
                            error = tracing::field::display(&e)
                        );
                        true
                    }
                }
            };
            if !still_exists && ledger.remove_dex_file(package, dex_path, user) {
                removed.insert(dex_path.as_str());
            }
        }

        report.removed = removed.len();
        self.store.maybe_write_async(report.removed > 0);
        report
    }
}
