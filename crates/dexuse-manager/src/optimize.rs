//! Secondary dex compilation driven by the usage ledger.

use dexuse_config::{log_manager_debug, log_manager_warn};

use crate::collaborators::SecondaryDexOpt;
use crate::manager::DexManager;
use crate::settings::CompilerTarget;

impl DexManager {
    /// Compile the secondary dex files recorded for `package`.
    ///
    /// Returns true if every file was compiled or skipped. Files of users the
    /// package is no longer installed for are dropped from the ledger.
    pub fn dexopt_secondary_dex(
        &self,
        package: &str,
        target: &CompilerTarget,
        force: bool,
        only_shared: bool,
    ) -> bool {
        let Some(usage) = self.package_use_info(package) else {
            log_manager_debug!("No secondary dex use", package = package);
            return true;
        };
        if !usage.has_secondary_dex() {
            return true;
        }

        let compiler_filter = self.settings.resolve_filter(target);
        let ledger = self.store.ledger();
        let mut success = true;
        let mut changed = false;

        for (dex_path, record) in usage.secondary_dex_files() {
            if only_shared && !record.used_by_other_apps {
                continue;
            }
            let user = record.owner_user_id;

            // The package may be uninstalled for this user while others keep it
            let app = match self.collaborators.authority.installed_package(package, user) {
                Ok(Some(app)) => app,
                Ok(None) => {
                    log_manager_debug!("Package gone for user", package = package, user = user);
                    changed |= ledger.remove_user_package(package, user);
                    continue;
                }
                Err(e) => {
                    log_manager_warn!(
                        "Package lookup failed",
                        package = package,
                        user = user,
                        error = tracing::field::display(&e)
                    );
                    success = false;
                    continue;
                }
            };

            let request = SecondaryDexOpt {
                app: &app,
                dex_path,
                isas: &record.loader_isas,
                compiler_filter,
                used_by_other_apps: record.used_by_other_apps,
                force,
            };
            if self.collaborators.optimizer.optimize_secondary(&request).is_failed() {
                log_manager_warn!("Secondary dex optimization failed", path = dex_path.as_str());
                success = false;
            }
        }

        self.store.maybe_write_async(changed);
        success
    }
}
