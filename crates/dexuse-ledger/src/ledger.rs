//! In-memory usage ledger.
//!
//! All mutations and reads go through one ledger-wide lock. The map is keyed by
//! package so the hot-path operations touch a single entry.

use std::collections::{BTreeSet, HashMap, HashSet};

use dexuse_config::{log_ledger_debug, log_ledger_warn};
use dexuse_index::UserId;
use parking_lot::Mutex;

use crate::record::{DexUseRecord, LedgerSnapshot, PackageUsage};
use crate::{LedgerError, Result};

#[derive(Debug, Default)]
pub struct UsageLedger {
    packages: Mutex<HashMap<String, PackageUsage>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dex_path` owned by `package` was loaded.
    ///
    /// Returns true if the ledger changed: a new record, a new instruction set,
    /// or a first load by another package. A primary or split apk loaded by its
    /// own package carries no information and is not recorded.
    pub fn record(
        &self,
        package: &str,
        dex_path: &str,
        user: UserId,
        isa: &str,
        used_by_other_apps: bool,
        primary_or_split: bool,
    ) -> Result<bool> {
        if primary_or_split && !used_by_other_apps {
            return Ok(false);
        }

        let mut packages = self.packages.lock();
        if let Some(existing) = packages
            .get_mut(package)
            .and_then(|usage| usage.dex_files.get_mut(dex_path))
        {
            if existing.is_secondary() && !primary_or_split && existing.owner_user_id != user {
                log_ledger_warn!(
                    "Refusing to change dex owner",
                    package = package,
                    path = dex_path,
                    existing = existing.owner_user_id,
                    requested = user
                );
                return Err(LedgerError::OwnerMismatch {
                    package: package.to_string(),
                    path: dex_path.to_string(),
                    existing: existing.owner_user_id,
                    requested: user,
                });
            }
            return Ok(existing.merge(isa, used_by_other_apps));
        }

        packages
            .entry(package.to_string())
            .or_default()
            .dex_files
            .insert(
                dex_path.to_string(),
                DexUseRecord::new(user, isa, used_by_other_apps, primary_or_split),
            );
        log_ledger_debug!(
            "New dex usage",
            package = package,
            path = dex_path,
            user = user,
            isa = isa
        );
        Ok(true)
    }

    /// Copy of the usage recorded for `package`.
    pub fn package_usage(&self, package: &str) -> Option<PackageUsage> {
        self.packages.lock().get(package).cloned()
    }

    /// Forget cross-package loads of `package`'s primary and split apks.
    ///
    /// Used after an update: the new binaries have not been loaded by anyone.
    pub fn clear_used_by_other_apps(&self, package: &str) -> bool {
        let mut packages = self.packages.lock();
        let Some(usage) = packages.get_mut(package) else {
            return false;
        };
        let before = usage.dex_files.len();
        usage.dex_files.retain(|_, r| r.is_secondary());
        let changed = usage.dex_files.len() != before;
        if usage.is_empty() {
            packages.remove(package);
        }
        changed
    }

    pub fn remove_package(&self, package: &str) -> bool {
        self.packages.lock().remove(package).is_some()
    }

    /// Remove every record of `package` owned by `user`.
    pub fn remove_user_package(&self, package: &str, user: UserId) -> bool {
        let mut packages = self.packages.lock();
        let Some(usage) = packages.get_mut(package) else {
            return false;
        };
        let before = usage.dex_files.len();
        usage.dex_files.retain(|_, r| r.owner_user_id != user);
        let changed = usage.dex_files.len() != before;
        if usage.is_empty() {
            packages.remove(package);
        }
        changed
    }

    /// Remove a single record, only if it is owned by `user`.
    pub fn remove_dex_file(&self, package: &str, dex_path: &str, user: UserId) -> bool {
        let mut packages = self.packages.lock();
        let Some(usage) = packages.get_mut(package) else {
            return false;
        };
        let owned = usage
            .dex_files
            .get(dex_path)
            .is_some_and(|r| r.owner_user_id == user);
        if !owned {
            return false;
        }
        usage.dex_files.remove(dex_path);
        if usage.is_empty() {
            packages.remove(package);
        }
        true
    }

    /// Packages with at least one secondary dex record
    pub fn packages_with_secondary_dex(&self) -> BTreeSet<String> {
        self.packages
            .lock()
            .iter()
            .filter(|(_, usage)| usage.has_secondary_dex())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// False when nothing is known about `package`.
    pub fn is_used_by_other_apps(&self, package: &str) -> bool {
        self.packages
            .lock()
            .get(package)
            .is_some_and(PackageUsage::is_used_by_other_apps)
    }

    /// Drop data for packages and users that are no longer installed.
    ///
    /// `installed` maps package name to the users it is installed for.
    pub fn sync_data(&self, installed: &HashMap<String, HashSet<UserId>>) -> bool {
        let mut changed = false;
        self.packages.lock().retain(|package, usage| {
            let Some(users) = installed.get(package) else {
                log_ledger_debug!("Pruning uninstalled package", package = package.as_str());
                changed = true;
                return false;
            };
            let before = usage.dex_files.len();
            usage
                .dex_files
                .retain(|_, r| users.contains(&r.owner_user_id));
            changed |= usage.dex_files.len() != before;
            !usage.is_empty()
        });
        changed
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let packages = self.packages.lock();
        LedgerSnapshot {
            packages: packages
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Replace the whole ledger.
    pub fn replace(&self, snapshot: LedgerSnapshot) {
        let mut packages = self.packages.lock();
        *packages = snapshot
            .packages
            .into_iter()
            .filter(|(_, usage)| !usage.is_empty())
            .collect();
    }

    pub fn clear(&self) {
        self.packages.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.packages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.lock().is_empty()
    }
}
