//! Package metadata as reported by the package authority.

use serde::{Deserialize, Serialize};

/// User profile id
pub type UserId = i32;

/// Sentinel meaning "every user profile"
pub const USER_ALL: UserId = -1;

/// Install metadata for one package as seen by one user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub package_name: String,
    #[serde(default)]
    pub uid: u32,
    /// Primary (base) code path
    pub source_dir: String,
    #[serde(default)]
    pub split_source_dirs: Vec<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub device_protected_data_dir: Option<String>,
    #[serde(default)]
    pub credential_protected_data_dir: Option<String>,
    #[serde(default)]
    pub volume_uuid: Option<String>,
    /// Instruction sets the app's code is compiled for
    #[serde(default)]
    pub instruction_sets: Vec<String>,
}

impl PackageInfo {
    pub fn new(package_name: impl Into<String>, source_dir: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            uid: 0,
            source_dir: source_dir.into(),
            split_source_dirs: Vec::new(),
            data_dir: None,
            device_protected_data_dir: None,
            credential_protected_data_dir: None,
            volume_uuid: None,
            instruction_sets: Vec::new(),
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    pub fn with_splits<I, S>(mut self, splits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.split_source_dirs = splits.into_iter().map(Into::into).collect();
        self
    }

    /// Set `data_dir`, also used as the credential-protected dir
    pub fn with_data_dir(mut self, dir: impl Into<String>) -> Self {
        let dir = dir.into();
        self.credential_protected_data_dir = Some(dir.clone());
        self.data_dir = Some(dir);
        self
    }

    pub fn with_device_protected_dir(mut self, dir: impl Into<String>) -> Self {
        self.device_protected_data_dir = Some(dir.into());
        self
    }

    pub fn with_instruction_sets<I, S>(mut self, isas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instruction_sets = isas.into_iter().map(Into::into).collect();
        self
    }

    /// Every private-storage directory that is set, `data_dir` first
    pub fn data_dirs(&self) -> impl Iterator<Item = &str> {
        [
            self.data_dir.as_deref(),
            self.device_protected_data_dir.as_deref(),
            self.credential_protected_data_dir.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dirs_skip_missing() {
        let info = PackageInfo::new("com.example.app", "/data/app/com.example.app/base.apk")
            .with_device_protected_dir("/data/user_de/0/com.example.app");
        let dirs: Vec<_> = info.data_dirs().collect();
        assert_eq!(dirs, vec!["/data/user_de/0/com.example.app"]);
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let json = r#"{"package_name":"com.example.app","source_dir":"/data/app/x/base.apk"}"#;
        let info: PackageInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.package_name, "com.example.app");
        assert!(info.split_source_dirs.is_empty());
        assert_eq!(info.data_dirs().count(), 0);
    }
}
