//! Ledger records.

use std::collections::{BTreeMap, BTreeSet};

use dexuse_index::UserId;
use serde::{Deserialize, Serialize};

/// Usage of one dex file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DexUseRecord {
    pub owner_user_id: UserId,
    /// Instruction sets the file was loaded under; only grows
    pub loader_isas: BTreeSet<String>,
    #[serde(default)]
    pub used_by_other_apps: bool,
    /// Cross-package load of the owner's primary or split apk
    #[serde(default)]
    pub primary_or_split: bool,
}

impl DexUseRecord {
    pub fn new(
        owner_user_id: UserId,
        isa: &str,
        used_by_other_apps: bool,
        primary_or_split: bool,
    ) -> Self {
        Self {
            owner_user_id,
            loader_isas: BTreeSet::from([isa.to_string()]),
            used_by_other_apps,
            primary_or_split,
        }
    }

    /// Merge a new observation; true if anything changed.
    pub fn merge(&mut self, isa: &str, used_by_other_apps: bool) -> bool {
        let new_isa = self.loader_isas.insert(isa.to_string());
        let promoted = used_by_other_apps && !self.used_by_other_apps;
        if promoted {
            self.used_by_other_apps = true;
        }
        new_isa || promoted
    }

    pub fn is_secondary(&self) -> bool {
        !self.primary_or_split
    }
}

/// Everything the ledger knows about one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageUsage {
    #[serde(default)]
    pub(crate) dex_files: BTreeMap<String, DexUseRecord>,
}

impl PackageUsage {
    pub fn dex_files(&self) -> &BTreeMap<String, DexUseRecord> {
        &self.dex_files
    }

    pub fn get(&self, dex_path: &str) -> Option<&DexUseRecord> {
        self.dex_files.get(dex_path)
    }

    /// Records of true secondary dex files
    pub fn secondary_dex_files(&self) -> impl Iterator<Item = (&String, &DexUseRecord)> {
        self.dex_files.iter().filter(|(_, r)| r.is_secondary())
    }

    pub fn has_secondary_dex(&self) -> bool {
        self.dex_files.values().any(DexUseRecord::is_secondary)
    }

    /// Whether any code of this package was loaded by another package
    pub fn is_used_by_other_apps(&self) -> bool {
        self.dex_files.values().any(|r| r.used_by_other_apps)
    }

    pub fn is_empty(&self) -> bool {
        self.dex_files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dex_files.len()
    }
}

/// Immutable copy of the whole ledger, ordered for stable output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub packages: BTreeMap<String, PackageUsage>,
}

impl LedgerSnapshot {
    pub fn get(&self, package: &str) -> Option<&PackageUsage> {
        self.packages.get(package)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Total number of dex records across packages
    pub fn record_count(&self) -> usize {
        self.packages.values().map(PackageUsage::len).sum()
    }
}
