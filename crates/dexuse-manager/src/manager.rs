//! The dex manager facade.
//!
//! Notification entry points never return tracking errors to the caller: they
//! run on the code loading path, so failures are logged and swallowed here.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use dexuse_config::{log_manager_debug, log_manager_error, log_manager_info, log_manager_warn};
use dexuse_index::{LocationIndex, OwnershipResolver, PackageInfo, SearchOutcome, UserId, USER_ALL};
use dexuse_ledger::{PackageUsage, UsageStore};
use parking_lot::Mutex;

use crate::collaborators::{ArtifactHelper, DexOptimizer, PackageAuthority, SecondaryDexOpt};
use crate::settings::{CompileReason, ManagerSettings};
use crate::{ManagerError, Result};

/// External services used by the manager
#[derive(Clone)]
pub struct Collaborators {
    pub authority: Arc<dyn PackageAuthority>,
    pub helper: Arc<dyn ArtifactHelper>,
    pub optimizer: Arc<dyn DexOptimizer>,
}

/// Outcome of [`DexManager::register_dex_module`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDexModuleResult {
    pub success: bool,
    pub message: String,
}

impl RegisterDexModuleResult {
    fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }

    fn rejected(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
        }
    }
}

pub struct DexManager {
    pub(crate) index: Arc<LocationIndex>,
    pub(crate) resolver: OwnershipResolver,
    pub(crate) store: UsageStore,
    pub(crate) collaborators: Collaborators,
    pub(crate) settings: ManagerSettings,
    /// Shared with whoever else talks to the artifact helper
    pub(crate) install_lock: Arc<Mutex<()>>,
}

impl DexManager {
    pub fn new(
        store: UsageStore,
        collaborators: Collaborators,
        settings: ManagerSettings,
        install_lock: Arc<Mutex<()>>,
    ) -> Self {
        let index = Arc::new(LocationIndex::new());
        let resolver = OwnershipResolver::new(index.clone(), settings.framework_roots.clone());
        Self {
            index,
            resolver,
            store,
            collaborators,
            settings,
            install_lock,
        }
    }

    pub fn index(&self) -> &Arc<LocationIndex> {
        &self.index
    }

    pub fn store(&self) -> &UsageStore {
        &self.store
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Record that `loading` loaded `dex_paths` under `isa` for `user`.
    pub fn notify_dex_load(
        &self,
        loading: &PackageInfo,
        dex_paths: &[String],
        isa: &str,
        user: UserId,
    ) {
        if !self.settings.is_supported_isa(isa) {
            log_manager_warn!(
                "Dex load in unsupported instruction set",
                package = loading.package_name.as_str(),
                isa = isa
            );
            return;
        }

        let ledger = self.store.ledger();
        let mut changed = false;
        for dex_path in dex_paths {
            let result = self.resolver.resolve(loading, dex_path, user);
            log_manager_debug!(
                "Dex load",
                loader = loading.package_name.as_str(),
                result = tracing::field::display(&result),
                user = user,
                path = dex_path.as_str()
            );

            // Bogus loads, or installs we have not been told about yet
            let Some(owner) = result.owner.as_deref() else {
                continue;
            };

            let used_by_other_apps = owner != loading.package_name;
            let primary_or_split = result.outcome.is_primary_or_split();
            if primary_or_split && !used_by_other_apps {
                continue;
            }

            match ledger.record(owner, dex_path, user, isa, used_by_other_apps, primary_or_split) {
                Ok(c) => changed |= c,
                Err(e) => log_manager_warn!(
                    "Failed to record dex load",
                    package = owner,
                    path = dex_path.as_str(),
                    error = tracing::field::display(&e)
                ),
            }
        }
        self.store.maybe_write_async(changed);
    }

    /// Populate the index from `existing` and read the persisted ledger,
    /// dropping anything recorded for packages or users no longer installed.
    pub fn load(&self, existing: &BTreeMap<UserId, Vec<PackageInfo>>) {
        let mut users_by_package: HashMap<String, HashSet<UserId>> = HashMap::new();
        for (&user, packages) in existing {
            for info in packages {
                self.index.cache_package(info, user);
                users_by_package
                    .entry(info.package_name.clone())
                    .or_default()
                    .insert(user);
            }
        }

        let snapshot = self.store.load();
        let pruned = self.store.sync_with_installed(&users_by_package);
        log_manager_info!(
            "Loaded dex usage",
            packages = snapshot.len(),
            indexed = self.index.len(),
            pruned = pruned
        );
    }

    /// [`load`](Self::load) with the current installed set from the authority.
    pub fn load_installed(&self) -> Result<()> {
        let existing = self.collaborators.authority.installed_packages()?;
        self.load(&existing);
        Ok(())
    }

    pub fn notify_package_installed(&self, info: &PackageInfo, user: UserId) -> Result<()> {
        if user == USER_ALL {
            return Err(ManagerError::InvalidArgument(
                "notify_package_installed called with USER_ALL".into(),
            ));
        }
        self.index.cache_package(info, user);
        Ok(())
    }

    /// New code paths for `package`. Forgets earlier cross-package loads of
    /// its primary and split apks.
    pub fn notify_package_updated(
        &self,
        package: &str,
        base_code_path: &str,
        split_code_paths: &[String],
    ) {
        self.index.upsert(package, base_code_path, split_code_paths);
        let changed = self.store.ledger().clear_used_by_other_apps(package);
        self.store.maybe_write_async(changed);
    }

    /// `user` may be [`USER_ALL`] to drop every record of the package.
    pub fn notify_package_data_destroyed(&self, package: &str, user: UserId) {
        let ledger = self.store.ledger();
        let changed = if user == USER_ALL {
            ledger.remove_package(package)
        } else {
            ledger.remove_user_package(package, user)
        };
        self.store.maybe_write_async(changed);
    }

    /// Stop attributing code to `package` for `user` (or every user).
    pub fn notify_package_removed(&self, package: &str, user: UserId) {
        let removed = if user == USER_ALL {
            self.index.remove(package)
        } else {
            self.index.remove_user(package, user)
        };
        if removed {
            log_manager_debug!("Pruned index", package = package, user = user);
        }
    }

    pub fn package_use_info(&self, package: &str) -> Option<PackageUsage> {
        self.store.ledger().package_usage(package)
    }

    /// Explicitly register a secondary dex owned by `app` and compile it.
    pub fn register_dex_module(
        &self,
        app: &PackageInfo,
        dex_path: &str,
        used_by_other_apps: bool,
        user: UserId,
    ) -> RegisterDexModuleResult {
        let exists = {
            let _guard = self.install_lock.lock();
            self.collaborators.helper.file_exists(dex_path)
        };
        match exists {
            Ok(true) => {}
            Ok(false) => return RegisterDexModuleResult::rejected("Dex module does not exist"),
            Err(e) => {
                log_manager_warn!(
                    "Could not check dex module",
                    path = dex_path,
                    error = tracing::field::display(&e)
                );
                return RegisterDexModuleResult::rejected("Dex module could not be accessed");
            }
        }

        let result = self.resolver.resolve(app, dex_path, user);
        if result.outcome == SearchOutcome::NotFound {
            return RegisterDexModuleResult::rejected("Package not found");
        }
        if result.owner.as_deref() != Some(app.package_name.as_str()) {
            return RegisterDexModuleResult::rejected("Dex path does not belong to package");
        }
        if result.outcome.is_primary_or_split() {
            return RegisterDexModuleResult::rejected("Main apks cannot be registered");
        }
        if app.instruction_sets.is_empty() {
            return RegisterDexModuleResult::rejected("Package has no instruction sets");
        }

        let ledger = self.store.ledger();
        let mut isas = BTreeSet::new();
        let mut changed = false;
        for isa in &app.instruction_sets {
            isas.insert(isa.clone());
            match ledger.record(&app.package_name, dex_path, user, isa, used_by_other_apps, false) {
                Ok(c) => changed |= c,
                Err(e) => log_manager_warn!(
                    "Failed to record dex module",
                    package = app.package_name.as_str(),
                    error = tracing::field::display(&e)
                ),
            }
        }
        self.store.maybe_write_async(changed);

        let request = SecondaryDexOpt {
            app,
            dex_path,
            isas: &isas,
            compiler_filter: self.settings.filter_for_reason(CompileReason::Install),
            used_by_other_apps,
            force: false,
        };
        // Background optimization retries later, the module is usable as is
        if self.collaborators.optimizer.optimize_secondary(&request).is_failed() {
            log_manager_error!("Failed to optimize dex module", path = dex_path);
        }
        RegisterDexModuleResult::ok("Dex module registered successfully")
    }

    pub fn is_used_by_other_apps(&self, package: &str) -> bool {
        self.store.ledger().is_used_by_other_apps(package)
    }

    pub fn packages_with_secondary_dex(&self) -> BTreeSet<String> {
        self.store.ledger().packages_with_secondary_dex()
    }

    /// Wait for scheduled ledger writes.
    pub fn flush(&self) {
        self.store.flush();
    }
}
