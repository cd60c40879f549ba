//! Package metadata authority backed by a JSON package database.
//!
//! The database maps a user id to the packages installed for it:
//!
//! ```json
//! { "0": [ { "package_name": "com.example.app",
//!            "source_dir": "/data/app/com.example.app/base.apk",
//!            "data_dir": "/data/user/0/com.example.app" } ] }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use dexuse_index::{PackageInfo, UserId};
use dexuse_manager::{AuthorityError, PackageAuthority};

pub struct JsonPackageDatabase {
    path: PathBuf,
    packages: BTreeMap<UserId, Vec<PackageInfo>>,
}

impl JsonPackageDatabase {
    /// Read the database. A missing file means nothing is installed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuthorityError> {
        let path = path.as_ref().to_path_buf();
        let packages = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                AuthorityError::Unavailable(format!("{}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, packages })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PackageAuthority for JsonPackageDatabase {
    fn installed_package(
        &self,
        package: &str,
        user: UserId,
    ) -> Result<Option<PackageInfo>, AuthorityError> {
        Ok(self
            .packages
            .get(&user)
            .and_then(|list| list.iter().find(|p| p.package_name == package))
            .cloned())
    }

    fn installed_packages(&self) -> Result<BTreeMap<UserId, Vec<PackageInfo>>, AuthorityError> {
        Ok(self.packages.clone())
    }
}
