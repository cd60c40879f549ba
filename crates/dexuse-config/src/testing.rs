//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary ledger location
//! - Per-user app data directories laid out like a device
//! - Installed code paths
//!
//! # Usage
//!
//! ```ignore
//! use dexuse_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new().unwrap();
//! let dex_path = env.app_data_dir("com.example.app", 0).join("code_cache/foo.jar");
//! let dex = env.create_file(dex_path, b"dex")?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment rooted in a temp dir
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Simulated `/data` root
    pub data_root: PathBuf,
    /// Ledger file for this test
    pub ledger_path: PathBuf,
    /// Package database file for this test
    pub packages_path: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let data_root = root.join("data");
        let system_dir = data_root.join("system");
        std::fs::create_dir_all(&system_dir)?;

        Ok(Self {
            ledger_path: system_dir.join(format!("package-dex-usage-{}.json", test_id)),
            packages_path: system_dir.join("packages.json"),
            data_root,
            _temp_dir: temp_dir,
            test_id,
        })
    }

    /// Primary code path for `package` (not created on disk)
    pub fn code_path(&self, package: &str) -> PathBuf {
        self.data_root.join("app").join(package).join("base.apk")
    }

    /// Credential-protected data dir for `package` under `user`, created on disk
    pub fn app_data_dir(&self, package: &str, user: i32) -> PathBuf {
        self.ensure_dir(
            self.data_root
                .join("user")
                .join(user.to_string())
                .join(package),
        )
    }

    /// Device-protected data dir for `package` under `user`, created on disk
    pub fn device_data_dir(&self, package: &str, user: i32) -> PathBuf {
        self.ensure_dir(
            self.data_root
                .join("user_de")
                .join(user.to_string())
                .join(package),
        )
    }

    /// Create a file with content, creating parents as needed
    pub fn create_file(&self, path: impl AsRef<Path>, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(path.to_path_buf())
    }

    /// Config pointing the ledger and package database into this environment
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.storage.ledger_path = self.ledger_path.clone();
        cfg.packages.database = self.packages_path.clone();
        cfg.persist.write_debounce_ms = 10;
        cfg
    }

    fn ensure_dir(&self, dir: PathBuf) -> PathBuf {
        // Creation failures surface later as missing-file assertions
        let _ = std::fs::create_dir_all(&dir);
        dir
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
