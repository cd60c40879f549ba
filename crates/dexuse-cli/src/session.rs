//! A loaded manager plus the lock that keeps other `dexuse` processes out.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dexuse_config::{log_cli_debug, Config};
use dexuse_ledger::UsageStore;
use dexuse_manager::{Collaborators, DexManager, ManagerSettings};
use fs2::FileExt;
use parking_lot::Mutex;

use crate::authority::JsonPackageDatabase;
use crate::helper::LocalArtifactHelper;
use crate::optimizer::CommandOptimizer;

const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

pub struct Session {
    // Dropped before the lock so the final ledger write happens while locked
    pub manager: DexManager,
    pub authority: Arc<JsonPackageDatabase>,
    _lock: File,
}

impl Session {
    pub fn open(config: &Config) -> Result<Self> {
        let ledger_path = config.storage.resolved_ledger_path();
        let lock = acquire_lock(&lock_path(&ledger_path))?;

        let store = UsageStore::open(&ledger_path, config.persist.write_debounce())
            .context("Failed to start ledger writer")?;
        let database = config.packages.resolved_database();
        let authority = Arc::new(
            JsonPackageDatabase::open(&database).with_context(|| {
                format!("Failed to read package database {}", database.display())
            })?,
        );
        let collaborators = Collaborators {
            authority: authority.clone(),
            helper: Arc::new(LocalArtifactHelper::new()),
            optimizer: Arc::new(CommandOptimizer::new(config.optimizer.command.clone())),
        };
        let manager = DexManager::new(
            store,
            collaborators,
            ManagerSettings::from_config(config),
            Arc::new(Mutex::new(())),
        );
        manager
            .load_installed()
            .context("Failed to load installed packages")?;

        log_cli_debug!(
            "Session opened",
            ledger = tracing::field::display(ledger_path.display()),
            packages = tracing::field::display(authority.path().display())
        );
        Ok(Self {
            manager,
            authority,
            _lock: lock,
        })
    }
}

fn lock_path(ledger_path: &Path) -> PathBuf {
    let mut name = ledger_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Take an exclusive lock on `path`, waiting up to `DEXUSE_LOCK_TIMEOUT` seconds.
fn acquire_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;

    let timeout_secs: u64 = std::env::var("DEXUSE_LOCK_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_LOCK_TIMEOUT_SECS);
    let timeout = Duration::from_secs(timeout_secs);
    let start = Instant::now();

    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if start.elapsed() >= timeout {
                    anyhow::bail!(
                        "Timeout waiting for ledger lock after {}s. \
                         Another dexuse process may be running.",
                        timeout_secs
                    );
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
