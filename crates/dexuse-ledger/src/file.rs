//! On-disk ledger format.
//!
//! The file is a versioned JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "packages": {
//!     "com.example.app": {
//!       "dex_files": {
//!         "/data/user/0/com.example.app/code_cache/foo.jar": {
//!           "owner_user_id": 0,
//!           "loader_isas": ["arm64"],
//!           "used_by_other_apps": false,
//!           "primary_or_split": false
//!         }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Writes go to a sibling temp file which is synced and renamed over the
//! target, so readers see either the old or the new document.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::record::{LedgerSnapshot, PackageUsage};
use crate::{LedgerError, Result};

/// Current on-disk format version
pub const LEDGER_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct LedgerDocument {
    version: u32,
    #[serde(default)]
    packages: BTreeMap<String, PackageUsage>,
}

/// Handle to the persisted ledger file.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the ledger. `Ok(None)` when the file does not exist.
    pub fn read(&self) -> Result<Option<LedgerSnapshot>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc: LedgerDocument = serde_json::from_reader(BufReader::new(file))?;
        if doc.version != LEDGER_VERSION {
            return Err(LedgerError::UnsupportedVersion {
                found: doc.version,
                expected: LEDGER_VERSION,
            });
        }
        validate(&doc.packages)?;
        Ok(Some(LedgerSnapshot {
            packages: doc.packages,
        }))
    }

    /// Sibling the document is staged in before the rename
    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Atomically replace the file with `snapshot`.
    pub fn write(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.tmp_path();

        let doc = LedgerDocument {
            version: LEDGER_VERSION,
            packages: snapshot.packages.clone(),
        };

        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(&file);
        serde_json::to_writer_pretty(&mut writer, &doc)?;
        writer.flush()?;
        drop(writer);
        file.sync_all()?;

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

fn validate(packages: &BTreeMap<String, PackageUsage>) -> Result<()> {
    for (package, usage) in packages {
        if package.is_empty() {
            return Err(LedgerError::Corrupt("empty package name".into()));
        }
        for (path, record) in usage.dex_files() {
            if !path.starts_with('/') {
                return Err(LedgerError::Corrupt(format!(
                    "{package}: dex path is not absolute: {path}"
                )));
            }
            if record.loader_isas.is_empty() {
                return Err(LedgerError::Corrupt(format!(
                    "{package}: no loader instruction set for {path}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UsageLedger;
    use tempfile::TempDir;

    fn sample() -> LedgerSnapshot {
        let ledger = UsageLedger::new();
        ledger
            .record(
                "com.example.app",
                "/data/user/0/com.example.app/a.jar",
                0,
                "arm64",
                false,
                false,
            )
            .unwrap();
        ledger
            .record("com.example.app", "/data/app/com.example.app/base.apk", 0, "arm", true, true)
            .unwrap();
        ledger.snapshot()
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        let file = LedgerFile::new(tmp.path().join("nope.json"));
        assert!(file.read().unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let file = LedgerFile::new(tmp.path().join("system/usage.json"));
        let snapshot = sample();
        file.write(&snapshot).unwrap();

        assert_eq!(file.read().unwrap(), Some(snapshot));
        assert!(!tmp.path().join("system/usage.json.tmp").exists());
    }

    #[test]
    fn test_temp_file_keeps_the_full_name() {
        let tmp = TempDir::new().unwrap();
        let file = LedgerFile::new(tmp.path().join("usage.dat"));
        assert_eq!(file.tmp_path(), tmp.path().join("usage.dat.tmp"));

        // A neighbour sharing the stem is left alone
        let neighbour = tmp.path().join("usage.json.tmp");
        fs::write(&neighbour, b"keep").unwrap();
        file.write(&sample()).unwrap();
        assert_eq!(fs::read(&neighbour).unwrap(), b"keep");
        assert_eq!(file.read().unwrap(), Some(sample()));
    }

    #[test]
    fn test_garbled_input_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("usage.json");
        fs::write(&path, b"{\"version\": 1, \"packages\": {\"com.x\": ").unwrap();
        let err = LedgerFile::new(&path).read().unwrap_err();
        assert!(matches!(err, LedgerError::Json(_)));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("usage.json");
        fs::write(&path, br#"{"version": 7, "packages": {}}"#).unwrap();
        let err = LedgerFile::new(&path).read().unwrap_err();
        assert!(matches!(err, LedgerError::UnsupportedVersion { found: 7, expected: 1 }));
    }

    #[test]
    fn test_record_without_isa_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("usage.json");
        let json = r#"{"version":1,"packages":{"com.x":{"dex_files":{
            "/data/user/0/com.x/a.jar":{"owner_user_id":0,"loader_isas":[]}}}}}"#;
        fs::write(&path, json).unwrap();
        assert!(matches!(
            LedgerFile::new(&path).read().unwrap_err(),
            LedgerError::Corrupt(_)
        ));
    }

    #[test]
    fn test_relative_path_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("usage.json");
        let json = r#"{"version":1,"packages":{"com.x":{"dex_files":{
            "a.jar":{"owner_user_id":0,"loader_isas":["arm"]}}}}}"#;
        fs::write(&path, json).unwrap();
        assert!(matches!(
            LedgerFile::new(&path).read().unwrap_err(),
            LedgerError::Corrupt(_)
        ));
    }
}
