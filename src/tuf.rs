use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// TUF metadata roles, in root-of-trust order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Root,
    Timestamp,
    Snapshot,
    Targets,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Root => "root",
            Role::Timestamp => "timestamp",
            Role::Snapshot => "snapshot",
            Role::Targets => "targets",
        })
    }
}

/// Source of raw signed role files for the metadata verifier.
pub trait MetadataFetcher {
    /// Fetch a specific version of a role, or the latest when `version`
    /// is `None`.
    fn fetch_role(&self, role: Role, version: Option<u64>) -> Result<Vec<u8>>;

    fn fetch_latest_role(&self, role: Role) -> Result<Vec<u8>> {
        self.fetch_role(role, None)
    }
}

/// Role files read straight from the bundle's `tuf/` directory:
/// `<version>.<role>.json`, or `<role>.json` for the latest.
pub struct FileMetadataFetcher {
    repo_path: PathBuf,
}

impl FileMetadataFetcher {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }
}

impl MetadataFetcher for FileMetadataFetcher {
    fn fetch_role(&self, role: Role, version: Option<u64>) -> Result<Vec<u8>> {
        let file_name = match version {
            Some(version) => format!("{version}.{role}.json"),
            None => format!("{role}.json"),
        };
        let path = self.repo_path.join(file_name);
        if !path.exists() {
            return Err(Error::MetadataFetch {
                role: role.to_string(),
                reason: format!("{} not found", path.display()),
            });
        }
        Ok(fs::read(path)?)
    }
}
