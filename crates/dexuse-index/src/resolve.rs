//! Dex ownership resolution.

use std::fmt;
use std::sync::Arc;

use crate::index::LocationIndex;
use crate::locations::{PackageCodeLocations, SearchOutcome};
use crate::types::{PackageInfo, UserId};

/// Result of an ownership search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexSearchResult {
    /// Owning package, `None` when nothing matched
    pub owner: Option<String>,
    pub outcome: SearchOutcome,
}

impl DexSearchResult {
    pub fn not_found() -> Self {
        Self {
            owner: None,
            outcome: SearchOutcome::NotFound,
        }
    }

    fn found(owner: String, outcome: SearchOutcome) -> Self {
        Self {
            owner: Some(owner),
            outcome,
        }
    }
}

impl fmt::Display for DexSearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.owner.as_deref().unwrap_or("<none>"),
            self.outcome
        )
    }
}

/// Answers "which package owns this file" from the in-memory index.
///
/// Resolution is best effort. Packages installed or removed without a
/// notification cause transient misses, which callers treat as "not tracked".
#[derive(Debug, Clone)]
pub struct OwnershipResolver {
    index: Arc<LocationIndex>,
    framework_roots: Vec<String>,
}

impl OwnershipResolver {
    pub fn new(index: Arc<LocationIndex>, framework_roots: Vec<String>) -> Self {
        Self {
            index,
            framework_roots,
        }
    }

    pub fn index(&self) -> &Arc<LocationIndex> {
        &self.index
    }

    /// Framework code is never attributed to an app.
    pub fn is_framework_path(&self, dex_path: &str) -> bool {
        self.framework_roots
            .iter()
            .any(|root| dex_path.starts_with(root.as_str()))
    }

    /// Find the package owning `dex_path` when loaded by `loading` under `user`.
    pub fn resolve(&self, loading: &PackageInfo, dex_path: &str, user: UserId) -> DexSearchResult {
        if self.is_framework_path(dex_path) {
            return DexSearchResult::not_found();
        }

        // A loader without private storage for this user is not active there
        if loading.data_dir.is_none() {
            return DexSearchResult::not_found();
        }

        // Most of the time the loading package owns the file
        let own = PackageCodeLocations::from_loading_app(loading, user);
        let outcome = own.search_dex(dex_path, user);
        if outcome.is_found() {
            return DexSearchResult::found(loading.package_name.clone(), outcome);
        }

        // Reverse lookup; may miss if the index fell behind installs
        match self.index.find_owner(dex_path, user) {
            Some((owner, outcome)) => DexSearchResult::found(owner, outcome),
            None => DexSearchResult::not_found(),
        }
    }
}
