//! Local file-system stand-in for the privileged artifact helper.
//!
//! Generated artifacts of `<dir>/<name>.jar` live in
//! `<dir>/oat/<isa>/<name>.{odex,vdex,art}`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dexuse_manager::{ArtifactCleanup, ArtifactHelper, HelperError};
use tracing::debug;

const ARTIFACT_EXTENSIONS: [&str; 3] = ["odex", "vdex", "art"];

#[derive(Debug, Default, Clone)]
pub struct LocalArtifactHelper;

impl LocalArtifactHelper {
    pub fn new() -> Self {
        Self
    }

    fn absolute(path: &str) -> Result<&Path, HelperError> {
        let p = Path::new(path);
        if p.is_absolute() {
            Ok(p)
        } else {
            Err(HelperError::Rejected(format!("not an absolute path: {path}")))
        }
    }

    /// Artifact paths for `dex` under every instruction set in `isas`
    pub fn artifact_paths(dex: &Path, isas: &[String]) -> Vec<PathBuf> {
        let (Some(dir), Some(stem)) = (dex.parent(), dex.file_stem()) else {
            return Vec::new();
        };
        let mut paths = Vec::with_capacity(isas.len() * ARTIFACT_EXTENSIONS.len());
        for isa in isas {
            let oat_dir = dir.join("oat").join(isa);
            for ext in ARTIFACT_EXTENSIONS {
                paths.push(oat_dir.join(format!("{}.{ext}", stem.to_string_lossy())));
            }
        }
        paths
    }
}

impl ArtifactHelper for LocalArtifactHelper {
    fn file_exists(&self, path: &str) -> Result<bool, HelperError> {
        Ok(Self::absolute(path)?.exists())
    }

    fn delete_generated_artifacts(&self, request: &ArtifactCleanup) -> Result<bool, HelperError> {
        let dex = Self::absolute(&request.dex_path)?;
        if dex.exists() {
            return Ok(true);
        }
        for artifact in Self::artifact_paths(dex, &request.isas) {
            match fs::remove_file(&artifact) {
                Ok(()) => debug!(path = %artifact.display(), "Deleted stale artifact"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }
}
