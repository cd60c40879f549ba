//! # dexuse-manager
//!
//! Tracks which installed package owns every dynamically loaded dex file and
//! keeps the usage history used to pick secondary dex files for
//! ahead-of-time compilation.
//!
//! `DexManager` is the entry point. It combines the location index, the usage
//! store and three external collaborators:
//!
//! - `PackageAuthority`: installed package metadata
//! - `ArtifactHelper`: privileged file checks and artifact cleanup
//! - `DexOptimizer`: the compiler front end

pub mod collaborators;
pub mod maintenance;
pub mod manager;
pub mod optimize;
pub mod reconcile;
pub mod settings;

pub use collaborators::{
    ArtifactCleanup, ArtifactHelper, AuthorityError, DexOptResult, DexOptimizer, HelperError,
    PackageAuthority, SecondaryDexOpt, StorageKind,
};
pub use maintenance::MaintenanceReport;
pub use manager::{Collaborators, DexManager, RegisterDexModuleResult};
pub use reconcile::ReconcileReport;
pub use settings::{CompileReason, CompilerTarget, ManagerSettings};

use dexuse_ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Package authority error: {0}")]
    Authority(#[from] AuthorityError),
}

pub type Result<T> = std::result::Result<T, ManagerError>;
