//! Code locations of a single package and the per-package matching rules.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::types::{PackageInfo, UserId};

/// Possible outcomes of a dex ownership search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchOutcome {
    /// No package owns the file
    NotFound,
    /// The file is the primary (base) apk
    FoundPrimary,
    /// The file is a split apk
    FoundSplit,
    /// The file lives in the package's private storage
    FoundSecondary,
}

impl SearchOutcome {
    pub fn is_found(self) -> bool {
        self != SearchOutcome::NotFound
    }

    pub fn is_primary_or_split(self) -> bool {
        matches!(self, SearchOutcome::FoundPrimary | SearchOutcome::FoundSplit)
    }
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchOutcome::NotFound => "not-found",
            SearchOutcome::FoundPrimary => "primary",
            SearchOutcome::FoundSplit => "split",
            SearchOutcome::FoundSecondary => "secondary",
        };
        f.write_str(s)
    }
}

/// Whether `path` is `dir` itself or lies below it.
///
/// Matching is per path component: `/data/data/com.a` does not contain
/// `/data/data/com.ab/x`. A trailing `/` on `dir` is ignored.
pub fn path_is_under(dir: &str, path: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        return false;
    }
    match path.strip_prefix(dir) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Where a package may own code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCodeLocations {
    package_name: String,
    base_code_path: String,
    split_code_paths: HashSet<String>,
    /// user id -> private storage directories
    app_data_dirs: HashMap<UserId, HashSet<String>>,
}

impl PackageCodeLocations {
    pub fn new(package_name: &str, base_code_path: &str, split_code_paths: &[String]) -> Self {
        let mut pcl = Self {
            package_name: package_name.to_string(),
            base_code_path: String::new(),
            split_code_paths: HashSet::new(),
            app_data_dirs: HashMap::new(),
        };
        pcl.update_code_location(base_code_path, split_code_paths);
        pcl
    }

    /// Locations of a loading app as it describes itself, for `user` only.
    pub fn from_loading_app(info: &PackageInfo, user: UserId) -> Self {
        let mut pcl = Self::new(&info.package_name, &info.source_dir, &info.split_source_dirs);
        if let Some(dir) = &info.data_dir {
            pcl.merge_app_data_dir(dir, user);
        }
        pcl
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn base_code_path(&self) -> &str {
        &self.base_code_path
    }

    pub fn split_code_paths(&self) -> &HashSet<String> {
        &self.split_code_paths
    }

    pub fn data_dirs(&self, user: UserId) -> Option<&HashSet<String>> {
        self.app_data_dirs.get(&user)
    }

    pub fn has_user(&self, user: UserId) -> bool {
        self.app_data_dirs.contains_key(&user)
    }

    /// Replace the primary and split paths.
    pub fn update_code_location(&mut self, base_code_path: &str, split_code_paths: &[String]) {
        self.base_code_path = base_code_path.to_string();
        self.split_code_paths.clear();
        self.split_code_paths.extend(split_code_paths.iter().cloned());
    }

    /// Returns true if the directory was not known yet.
    pub fn merge_app_data_dir(&mut self, data_dir: &str, user: UserId) -> bool {
        self.app_data_dirs
            .entry(user)
            .or_default()
            .insert(data_dir.to_string())
    }

    pub fn remove_user(&mut self, user: UserId) -> bool {
        self.app_data_dirs.remove(&user).is_some()
    }

    /// Classify `dex_path` relative to this package for `user`.
    pub fn search_dex(&self, dex_path: &str, user: UserId) -> SearchOutcome {
        // A missing data dir means the package is not installed for the user
        let Some(user_data_dirs) = self.app_data_dirs.get(&user) else {
            return SearchOutcome::NotFound;
        };

        if self.base_code_path == dex_path {
            return SearchOutcome::FoundPrimary;
        }
        if self.split_code_paths.contains(dex_path) {
            return SearchOutcome::FoundSplit;
        }
        if user_data_dirs
            .iter()
            .any(|dir| path_is_under(dir, dex_path))
        {
            return SearchOutcome::FoundSecondary;
        }

        SearchOutcome::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locations() -> PackageCodeLocations {
        let mut pcl = PackageCodeLocations::new(
            "com.example.app",
            "/data/app/com.example.app/base.apk",
            &[
                "/data/app/com.example.app/split_a.apk".to_string(),
                "/data/app/com.example.app/split_b.apk".to_string(),
            ],
        );
        pcl.merge_app_data_dir("/data/user/0/com.example.app", 0);
        pcl
    }

    #[test]
    fn test_path_is_under() {
        assert!(path_is_under("/data/data/com.a", "/data/data/com.a/x.jar"));
        assert!(path_is_under("/data/data/com.a/", "/data/data/com.a/x.jar"));
        assert!(path_is_under("/data/data/com.a", "/data/data/com.a"));
        assert!(!path_is_under("/data/data/com.a", "/data/data/com.ab/x.jar"));
        assert!(!path_is_under("/", "/anything"));
    }

    #[test]
    fn test_search_primary_split_secondary() {
        let pcl = locations();
        assert_eq!(
            pcl.search_dex("/data/app/com.example.app/base.apk", 0),
            SearchOutcome::FoundPrimary
        );
        assert_eq!(
            pcl.search_dex("/data/app/com.example.app/split_b.apk", 0),
            SearchOutcome::FoundSplit
        );
        assert_eq!(
            pcl.search_dex("/data/user/0/com.example.app/code_cache/foo.jar", 0),
            SearchOutcome::FoundSecondary
        );
        assert_eq!(
            pcl.search_dex("/data/app/com.example.app/other.apk", 0),
            SearchOutcome::NotFound
        );
    }

    #[test]
    fn test_search_requires_user_data_dir() {
        let pcl = locations();
        // Even the primary path is not attributed for a user without a data dir
        assert_eq!(
            pcl.search_dex("/data/app/com.example.app/base.apk", 10),
            SearchOutcome::NotFound
        );
        assert_eq!(
            pcl.search_dex("/data/user/0/com.example.app/code_cache/foo.jar", 10),
            SearchOutcome::NotFound
        );
    }

    #[test]
    fn test_update_replaces_splits() {
        let mut pcl = locations();
        pcl.update_code_location("/data/app/com.example.app-2/base.apk", &[]);
        assert!(pcl.split_code_paths().is_empty());
        assert_eq!(
            pcl.search_dex("/data/app/com.example.app/split_a.apk", 0),
            SearchOutcome::NotFound
        );
        // Data dirs survive a code update
        assert!(pcl.has_user(0));
    }

    #[test]
    fn test_merge_data_dir_is_idempotent() {
        let mut pcl = locations();
        assert!(!pcl.merge_app_data_dir("/data/user/0/com.example.app", 0));
        assert!(pcl.merge_app_data_dir("/data/user_de/0/com.example.app", 0));
        assert_eq!(pcl.data_dirs(0).map(|d| d.len()), Some(2));
    }
}
