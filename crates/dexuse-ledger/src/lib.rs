//! # dexuse-ledger
//!
//! Durable record of every secondary dex file that was loaded: which package
//! owns it, for which user, under which instruction sets, and whether another
//! package loaded it.
//!
//! ## Layers
//!
//! - `UsageLedger`: in-memory ledger behind a single lock
//! - `LedgerFile`: versioned JSON file with atomic replace
//! - `WriteScheduler`: single background writer that coalesces triggers
//! - `UsageStore`: ledger + file + writer, the persistence driver

pub mod file;
pub mod ledger;
pub mod record;
pub mod store;
pub mod writer;

pub use file::{LedgerFile, LEDGER_VERSION};
pub use ledger::UsageLedger;
pub use record::{DexUseRecord, LedgerSnapshot, PackageUsage};
pub use store::UsageStore;
pub use writer::{WriteScheduler, WriteStats};

use std::io;

use dexuse_index::UserId;
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported ledger version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Corrupt ledger: {0}")]
    Corrupt(String),

    #[error("Dex file {path} of {package} belongs to user {existing}, not {requested}")]
    OwnerMismatch {
        package: String,
        path: String,
        existing: UserId,
        requested: UserId,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
