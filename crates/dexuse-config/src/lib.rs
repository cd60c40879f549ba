//! # dexuse-config
//!
//! Configuration management for dexuse.
//!
//! Loads configuration from:
//! 1. `~/.dexuse/config.toml` (global)
//! 2. `.dexuse/config.toml` (local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod testing;

pub use tracing;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub persist: PersistConfig,
    pub tracking: TrackingConfig,
    pub compiler: CompilerConfig,
    pub optimizer: OptimizerConfig,
    pub maintenance: MaintenanceConfig,
    pub packages: PackagesConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let mut config = Self::load_from(global.as_deref(), Some(&Self::project_config_path()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load and layer the given files without consulting the environment.
    ///
    /// Missing files are skipped.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global.filter(|p| p.exists()) {
            debug!("Loading global config from {:?}", global_path);
            let contents = std::fs::read_to_string(global_path)?;
            config = toml::from_str(&contents)?;
        }

        if let Some(project_path) = project.filter(|p| p.exists()) {
            debug!("Loading project config from {:?}", project_path);
            let contents = std::fs::read_to_string(project_path)?;
            let project_config: Config = toml::from_str(&contents)?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Global config path: ~/.dexuse/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".dexuse/config.toml"))
    }

    /// Project config path: .dexuse/config.toml (relative to the working directory)
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".dexuse/config.toml")
    }

    /// Merge a more specific config on top of this one.
    ///
    /// A section field replaces ours only when it differs from its default.
    fn merge(&mut self, other: Config) {
        let defaults = Config::default();

        if other.storage.ledger_path != defaults.storage.ledger_path {
            self.storage.ledger_path = other.storage.ledger_path;
        }
        if other.persist.write_debounce_ms != defaults.persist.write_debounce_ms {
            self.persist.write_debounce_ms = other.persist.write_debounce_ms;
        }
        if other.tracking.framework_roots != defaults.tracking.framework_roots {
            self.tracking.framework_roots = other.tracking.framework_roots;
        }
        if other.tracking.supported_isas != defaults.tracking.supported_isas {
            self.tracking.supported_isas = other.tracking.supported_isas;
        }
        // Reason filters merge key by key
        for (reason, filter) in other.compiler.filters {
            if defaults.compiler.filters.get(&reason) != Some(&filter) {
                self.compiler.filters.insert(reason, filter);
            }
        }
        if !other.optimizer.command.is_empty() {
            self.optimizer.command = other.optimizer.command;
        }
        if other.maintenance.interval_secs != defaults.maintenance.interval_secs {
            self.maintenance.interval_secs = other.maintenance.interval_secs;
        }
        if other.packages.database != defaults.packages.database {
            self.packages.database = other.packages.database;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("DEXUSE_LEDGER") {
            self.storage.ledger_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("DEXUSE_PACKAGES") {
            self.packages.database = PathBuf::from(path);
        }
        if let Ok(ms) = std::env::var("DEXUSE_WRITE_DEBOUNCE_MS") {
            if let Ok(n) = ms.parse() {
                self.persist.write_debounce_ms = n;
            }
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_path(p: &Path) -> PathBuf {
    if let Ok(stripped) = p.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    p.to_path_buf()
}

/// Ledger storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Location of the persisted usage ledger
    pub ledger_path: PathBuf,
}

impl StorageConfig {
    pub fn resolved_ledger_path(&self) -> PathBuf {
        expand_path(&self.ledger_path)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("~/.dexuse/package-dex-usage.json"),
        }
    }
}

/// Background write configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// How long the writer waits for more changes before writing
    pub write_debounce_ms: u64,
}

impl PersistConfig {
    pub fn write_debounce(&self) -> Duration {
        Duration::from_millis(self.write_debounce_ms)
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            write_debounce_ms: 1000,
        }
    }
}

/// Ownership tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Framework code roots; loads under these are never attributed to a package
    pub framework_roots: Vec<String>,
    /// Instruction sets accepted from load notifications
    pub supported_isas: Vec<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            framework_roots: vec!["/system/framework/".to_string()],
            supported_isas: ["arm", "arm64", "x86", "x86_64", "mips", "mips64", "riscv64"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Compile reason to compiler filter mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub filters: BTreeMap<String, String>,
}

impl CompilerConfig {
    pub fn filter_for(&self, reason: &str) -> Option<&str> {
        self.filters.get(reason).map(|s| s.as_str())
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let filters = [
            ("first-boot", "verify"),
            ("boot", "verify"),
            ("install", "speed-profile"),
            ("bg-dexopt", "speed-profile"),
            ("ab-ota", "speed-profile"),
            ("inactive", "verify"),
            ("shared", "speed"),
        ]
        .iter()
        .map(|(r, f)| (r.to_string(), f.to_string()))
        .collect();
        Self { filters }
    }
}

/// External optimizer invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Program and leading arguments; empty disables optimization
    pub command: Vec<String>,
}

/// Periodic maintenance configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
        }
    }
}

/// Installed package database used by the command-line front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    pub database: PathBuf,
}

impl PackagesConfig {
    pub fn resolved_database(&self) -> PathBuf {
        expand_path(&self.database)
    }
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("~/.dexuse/packages.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tracking.framework_roots, vec!["/system/framework/"]);
        assert!(config.tracking.supported_isas.contains(&"arm64".to_string()));
        assert_eq!(config.compiler.filter_for("install"), Some("speed-profile"));
        assert!(config.optimizer.command.is_empty());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[tracking]"));
        assert!(toml_str.contains("package-dex-usage.json"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_merge_keeps_global_when_project_is_default() {
        let mut global = Config::default();
        global.persist.write_debounce_ms = 5;
        global.optimizer.command = vec!["dexopt".into()];

        let mut project = Config::default();
        project.compiler.filters.insert("install".into(), "speed".into());

        global.merge(project);
        assert_eq!(global.persist.write_debounce_ms, 5);
        assert_eq!(global.optimizer.command, vec!["dexopt"]);
        assert_eq!(global.compiler.filter_for("install"), Some("speed"));
        assert_eq!(global.compiler.filter_for("boot"), Some("verify"));
    }

    #[test]
    fn test_expand_path_keeps_absolute() {
        let p = Path::new("/data/system/package-dex-usage.json");
        assert_eq!(expand_path(p), p.to_path_buf());
    }
}
