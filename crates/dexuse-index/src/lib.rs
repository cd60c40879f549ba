//! # dexuse-index
//!
//! In-memory index of where every installed package keeps its code, and the
//! resolver that answers "which package owns this dex file".
//!
//! The index is rebuilt from install/update/enumeration notifications and is
//! the only thing the resolver consults: resolution never performs I/O and
//! never waits on the package metadata authority.

pub mod index;
pub mod locations;
pub mod resolve;
pub mod types;

pub use index::LocationIndex;
pub use locations::{path_is_under, PackageCodeLocations, SearchOutcome};
pub use resolve::{DexSearchResult, OwnershipResolver};
pub use types::{PackageInfo, UserId, USER_ALL};
