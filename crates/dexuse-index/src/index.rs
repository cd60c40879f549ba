//! Package code location index.
//!
//! Every mutation and the reverse scan run under one exclusive lock over the
//! whole map. Installs are rare compared to loads, so correctness wins over
//! throughput here. Iteration order is insertion order, which makes the
//! reverse-scan policy (first match wins) deterministic.

use indexmap::IndexMap;
use parking_lot::Mutex;

use dexuse_config::log_index_debug;

use crate::locations::{PackageCodeLocations, SearchOutcome};
use crate::types::{PackageInfo, UserId};

/// Maps package name to the locations where it may own code.
#[derive(Debug, Default)]
pub struct LocationIndex {
    packages: Mutex<IndexMap<String, PackageCodeLocations>>,
}

impl LocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache code paths and every known data dir of `info` for `user`.
    pub fn cache_package(&self, info: &PackageInfo, user: UserId) {
        let mut packages = self.packages.lock();
        let pcl = packages
            .entry(info.package_name.clone())
            .or_insert_with(|| {
                PackageCodeLocations::new(
                    &info.package_name,
                    &info.source_dir,
                    &info.split_source_dirs,
                )
            });
        pcl.update_code_location(&info.source_dir, &info.split_source_dirs);
        for dir in info.data_dirs() {
            pcl.merge_app_data_dir(dir, user);
        }
        log_index_debug!(
            "Cached package locations",
            package = info.package_name.as_str(),
            user = user
        );
    }

    /// Replace the code paths of `package`, creating the entry if needed.
    pub fn upsert(&self, package: &str, base_code_path: &str, split_code_paths: &[String]) {
        let mut packages = self.packages.lock();
        match packages.get_mut(package) {
            Some(pcl) => pcl.update_code_location(base_code_path, split_code_paths),
            None => {
                packages.insert(
                    package.to_string(),
                    PackageCodeLocations::new(package, base_code_path, split_code_paths),
                );
            }
        }
    }

    /// Add a private storage dir. Unknown packages are left alone.
    pub fn merge_data_dir(&self, package: &str, user: UserId, dir: &str) -> bool {
        self.packages
            .lock()
            .get_mut(package)
            .map(|pcl| pcl.merge_app_data_dir(dir, user))
            .unwrap_or(false)
    }

    /// Snapshot of `package`'s locations if it is active for `user`.
    pub fn lookup_own_locations(
        &self,
        package: &str,
        user: UserId,
    ) -> Option<PackageCodeLocations> {
        self.packages
            .lock()
            .get(package)
            .filter(|pcl| pcl.has_user(user))
            .cloned()
    }

    /// Consistent snapshot of the whole index in insertion order.
    pub fn scan_all(&self) -> Vec<PackageCodeLocations> {
        self.packages.lock().values().cloned().collect()
    }

    /// Reverse lookup: the first package (insertion order) that owns `dex_path`.
    pub fn find_owner(&self, dex_path: &str, user: UserId) -> Option<(String, SearchOutcome)> {
        let packages = self.packages.lock();
        packages.values().find_map(|pcl| {
            let outcome = pcl.search_dex(dex_path, user);
            outcome
                .is_found()
                .then(|| (pcl.package_name().to_string(), outcome))
        })
    }

    /// Forget the data dirs `package` has for `user`.
    pub fn remove_user(&self, package: &str, user: UserId) -> bool {
        self.packages
            .lock()
            .get_mut(package)
            .map(|pcl| pcl.remove_user(user))
            .unwrap_or(false)
    }

    /// Drop `package` entirely.
    pub fn remove(&self, package: &str) -> bool {
        self.packages.lock().shift_remove(package).is_some()
    }

    pub fn contains(&self, package: &str) -> bool {
        self.packages.lock().contains_key(package)
    }

    pub fn len(&self) -> usize {
        self.packages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.lock().is_empty()
    }
}
