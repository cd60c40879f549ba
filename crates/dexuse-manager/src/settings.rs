//! Manager settings and compiler filter selection.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use dexuse_config::Config;

use crate::ManagerError;

/// Filter used when a reason has no configured mapping
pub const FALLBACK_FILTER: &str = "verify";

/// Why an optimization was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileReason {
    FirstBoot,
    Boot,
    Install,
    BgDexopt,
    AbOta,
    Inactive,
    Shared,
}

impl CompileReason {
    pub const ALL: [CompileReason; 7] = [
        CompileReason::FirstBoot,
        CompileReason::Boot,
        CompileReason::Install,
        CompileReason::BgDexopt,
        CompileReason::AbOta,
        CompileReason::Inactive,
        CompileReason::Shared,
    ];

    /// Name used in the `[compiler]` config table
    pub fn as_str(self) -> &'static str {
        match self {
            CompileReason::FirstBoot => "first-boot",
            CompileReason::Boot => "boot",
            CompileReason::Install => "install",
            CompileReason::BgDexopt => "bg-dexopt",
            CompileReason::AbOta => "ab-ota",
            CompileReason::Inactive => "inactive",
            CompileReason::Shared => "shared",
        }
    }
}

impl fmt::Display for CompileReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompileReason {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompileReason::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ManagerError::InvalidArgument(format!("unknown compile reason: {s}")))
    }
}

/// What to compile secondary dex files with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerTarget {
    Reason(CompileReason),
    Filter(String),
}

/// Everything the manager reads from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    pub framework_roots: Vec<String>,
    pub supported_isas: Vec<String>,
    pub compiler_filters: BTreeMap<String, String>,
}

impl ManagerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            framework_roots: config.tracking.framework_roots.clone(),
            supported_isas: config.tracking.supported_isas.clone(),
            compiler_filters: config.compiler.filters.clone(),
        }
    }

    pub fn is_supported_isa(&self, isa: &str) -> bool {
        self.supported_isas.iter().any(|s| s == isa)
    }

    pub fn filter_for_reason(&self, reason: CompileReason) -> &str {
        self.compiler_filters
            .get(reason.as_str())
            .map(String::as_str)
            .unwrap_or(FALLBACK_FILTER)
    }

    pub fn resolve_filter<'a>(&'a self, target: &'a CompilerTarget) -> &'a str {
        match target {
            CompilerTarget::Reason(reason) => self.filter_for_reason(*reason),
            CompilerTarget::Filter(filter) => filter,
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
