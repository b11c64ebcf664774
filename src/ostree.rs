use crate::error::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Source of `ref name -> commit` pairs for an OSTree repository.
pub trait RefSource {
    fn refs(&self) -> Result<BTreeMap<String, String>>;
}

/// A bare OSTree repository on disk.
///
/// Refs live as plain files under `refs/heads/`, one commit hash per file;
/// the ref name is the path relative to that directory.
pub struct OstreeRepo {
    root: PathBuf,
}

impl OstreeRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl RefSource for OstreeRepo {
    fn refs(&self) -> Result<BTreeMap<String, String>> {
        let heads = self.root.join("refs").join("heads");
        let mut refs = BTreeMap::new();
        for entry in walkdir::WalkDir::new(&heads) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .strip_prefix(&heads)
                .expect("WalkDir returns paths under its root")
                .to_string_lossy()
                .into_owned();
            let commit = fs::read_to_string(entry.path())?.trim().to_string();
            refs.insert(name, commit);
        }
        Ok(refs)
    }
}
