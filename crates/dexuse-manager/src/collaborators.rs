//! Interfaces to the services the manager depends on but does not implement.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use dexuse_index::{PackageInfo, UserId};
use thiserror::Error;

/// The package metadata authority could not answer.
#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("Package metadata unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The privileged file-system helper failed. Distinct from "file missing".
#[derive(Error, Debug)]
pub enum HelperError {
    #[error("Helper rejected request: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of truth for what is installed where.
pub trait PackageAuthority: Send + Sync {
    /// Install metadata of `package` for `user`; `Ok(None)` if not installed.
    fn installed_package(
        &self,
        package: &str,
        user: UserId,
    ) -> Result<Option<PackageInfo>, AuthorityError>;

    /// Every installed package, grouped by user.
    fn installed_packages(&self) -> Result<BTreeMap<UserId, Vec<PackageInfo>>, AuthorityError>;
}

/// Which private storage area a secondary dex lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    DeviceProtected,
    CredentialProtected,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::DeviceProtected => f.write_str("de"),
            StorageKind::CredentialProtected => f.write_str("ce"),
        }
    }
}

/// Request to drop generated artifacts of a secondary dex that may be gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCleanup {
    pub dex_path: String,
    pub package_name: String,
    pub uid: u32,
    pub isas: Vec<String>,
    pub volume_uuid: Option<String>,
    pub storage: StorageKind,
}

/// Privileged file-system operations.
pub trait ArtifactHelper: Send + Sync {
    fn file_exists(&self, path: &str) -> Result<bool, HelperError>;

    /// Returns `Ok(true)` if the dex file still exists. Otherwise its generated
    /// artifacts are deleted and `Ok(false)` is returned.
    fn delete_generated_artifacts(&self, request: &ArtifactCleanup) -> Result<bool, HelperError>;
}

/// One secondary dex optimization request.
#[derive(Debug, Clone)]
pub struct SecondaryDexOpt<'a> {
    pub app: &'a PackageInfo,
    pub dex_path: &'a str,
    pub isas: &'a BTreeSet<String>,
    pub compiler_filter: &'a str,
    pub used_by_other_apps: bool,
    /// Compile even if existing artifacts look up to date
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DexOptResult {
    Performed,
    Skipped,
    Failed,
}

impl DexOptResult {
    pub fn is_failed(self) -> bool {
        self == DexOptResult::Failed
    }
}

/// Ahead-of-time compiler front end.
pub trait DexOptimizer: Send + Sync {
    fn optimize_secondary(&self, request: &SecondaryDexOpt<'_>) -> DexOptResult;
}
