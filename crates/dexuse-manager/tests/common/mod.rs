//! In-memory collaborators and a manager wired to them.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dexuse_config::testing::TestEnvironment;
use dexuse_index::{PackageInfo, UserId};
use dexuse_ledger::UsageStore;
use dexuse_manager::{
    ArtifactCleanup, ArtifactHelper, AuthorityError, Collaborators, DexManager, DexOptResult,
    DexOptimizer, HelperError, ManagerSettings, PackageAuthority, SecondaryDexOpt,
};
use parking_lot::Mutex;

pub const APP: &str = "com.example.app";
pub const OTHER: &str = "com.example.other";

/// Installed package shaped like a device install for `user`.
pub fn app(name: &str, user: UserId) -> PackageInfo {
    PackageInfo::new(name, format!("/data/app/{name}/base.apk"))
        .with_uid(10_000 + name.len() as u32)
        .with_splits([format!("/data/app/{name}/split_1.apk")])
        .with_data_dir(format!("/data/user/{user}/{name}"))
        .with_device_protected_dir(format!("/data/user_de/{user}/{name}"))
        .with_instruction_sets(["arm64"])
}

pub fn secondary(name: &str, user: UserId, file: &str) -> String {
    format!("/data/user/{user}/{name}/code_cache/{file}")
}

#[derive(Default)]
pub struct FakeAuthority {
    packages: Mutex<BTreeMap<UserId, Vec<PackageInfo>>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeAuthority {
    pub fn install(&self, user: UserId, info: PackageInfo) {
        self.packages.lock().entry(user).or_default().push(info);
    }

    pub fn uninstall(&self, package: &str, user: UserId) {
        if let Some(list) = self.packages.lock().get_mut(&user) {
            list.retain(|p| p.package_name != package);
        }
    }

    pub fn fail(&self, package: &str) {
        self.failing.lock().insert(package.to_string());
    }
}

impl PackageAuthority for FakeAuthority {
    fn installed_package(
        &self,
        package: &str,
        user: UserId,
    ) -> Result<Option<PackageInfo>, AuthorityError> {
        if self.failing.lock().contains(package) {
            return Err(AuthorityError::Unavailable(format!("{package} lookup timed out")));
        }
        Ok(self
            .packages
            .lock()
            .get(&user)
            .and_then(|list| list.iter().find(|p| p.package_name == package).cloned()))
    }

    fn installed_packages(&self) -> Result<BTreeMap<UserId, Vec<PackageInfo>>, AuthorityError> {
        Ok(self.packages.lock().clone())
    }
}

/// Helper that also notes calls made while the install lock was free.
#[derive(Default)]
pub struct FakeHelper {
    existing: Mutex<HashSet<String>>,
    broken: Mutex<HashSet<String>>,
    pub cleanups: Mutex<Vec<ArtifactCleanup>>,
    pub install_lock: Arc<Mutex<()>>,
    pub unlocked_calls: Mutex<Vec<String>>,
}

impl FakeHelper {
    fn check_locked(&self, path: &str) {
        if self.install_lock.try_lock().is_some() {
            self.unlocked_calls.lock().push(path.to_string());
        }
    }

    pub fn create(&self, path: &str) {
        self.existing.lock().insert(path.to_string());
    }

    pub fn delete(&self, path: &str) {
        self.existing.lock().remove(path);
    }

    pub fn break_path(&self, path: &str) {
        self.broken.lock().insert(path.to_string());
    }
}

impl ArtifactHelper for FakeHelper {
    fn file_exists(&self, path: &str) -> Result<bool, HelperError> {
        self.check_locked(path);
        Ok(self.existing.lock().contains(path))
    }

    fn delete_generated_artifacts(&self, request: &ArtifactCleanup) -> Result<bool, HelperError> {
        self.check_locked(&request.dex_path);
        if self.broken.lock().contains(&request.dex_path) {
            return Err(HelperError::Rejected("installd not responding".into()));
        }
        let exists = self.existing.lock().contains(&request.dex_path);
        if !exists {
            self.cleanups.lock().push(request.clone());
        }
        Ok(exists)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptCall {
    pub package: String,
    pub dex_path: String,
    pub isas: Vec<String>,
    pub filter: String,
    pub used_by_other_apps: bool,
    pub force: bool,
}

pub struct FakeOptimizer {
    pub result: Mutex<DexOptResult>,
    pub calls: Mutex<Vec<OptCall>>,
}

impl Default for FakeOptimizer {
    fn default() -> Self {
        Self {
            result: Mutex::new(DexOptResult::Performed),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl DexOptimizer for FakeOptimizer {
    fn optimize_secondary(&self, request: &SecondaryDexOpt<'_>) -> DexOptResult {
        self.calls.lock().push(OptCall {
            package: request.app.package_name.clone(),
            dex_path: request.dex_path.to_string(),
            isas: request.isas.iter().cloned().collect(),
            filter: request.compiler_filter.to_string(),
            used_by_other_apps: request.used_by_other_apps,
            force: request.force,
        });
        *self.result.lock()
    }
}

pub struct Harness {
    pub env: TestEnvironment,
    pub manager: Arc<DexManager>,
    pub authority: Arc<FakeAuthority>,
    pub helper: Arc<FakeHelper>,
    pub optimizer: Arc<FakeOptimizer>,
}

impl Harness {
    pub fn new() -> Self {
        let env = TestEnvironment::new().unwrap();
        Self::with_env(env)
    }

    pub fn with_env(env: TestEnvironment) -> Self {
        let config = env.config();
        let store = UsageStore::open(&env.ledger_path, config.persist.write_debounce()).unwrap();
        let authority = Arc::new(FakeAuthority::default());
        let helper = Arc::new(FakeHelper::default());
        let optimizer = Arc::new(FakeOptimizer::default());
        let collaborators = Collaborators {
            authority: authority.clone(),
            helper: helper.clone(),
            optimizer: optimizer.clone(),
        };
        let manager = DexManager::new(
            store,
            collaborators,
            ManagerSettings::from_config(&config),
            helper.install_lock.clone(),
        );
        Self {
            env,
            manager: Arc::new(manager),
            authority,
            helper,
            optimizer,
        }
    }

    /// Install `name` for `user` in both the authority and the manager.
    pub fn install(&self, name: &str, user: UserId) -> PackageInfo {
        let info = app(name, user);
        self.authority.install(user, info.clone());
        self.manager.notify_package_installed(&info, user).unwrap();
        info
    }

    pub fn writes(&self) -> u64 {
        self.manager.flush();
        self.manager.store().stats().written
    }
}
