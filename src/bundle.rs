use crate::error::Result;
use crate::ostree::RefSource;
use std::fs;
use std::path::{Path, PathBuf};

/// The on-disk update medium.
///
/// ```text
/// <root>/
///   ostree/                     bare OSTree repository
///   apps/<name>/<digest-hex>/   uri, docker-compose.yml, images/…
///   blobs/sha256/<hex>          shared content-addressed object store
///   tuf/                        signed metadata role files
/// ```
#[derive(Debug, Clone)]
pub struct UpdateBundle {
    root: PathBuf,
}

/// What a bundle actually contains, as compared against signed targets.
#[derive(Debug, Clone, Default)]
pub struct UpdateContent {
    pub ostree_commits: Vec<String>,
    pub app_uris: Vec<String>,
}

impl UpdateBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ostree_repo_dir(&self) -> PathBuf {
        self.root.join("ostree")
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.root.join("apps")
    }

    /// Shared blob root, the directory holding `sha256/`.
    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    pub fn tuf_dir(&self) -> PathBuf {
        self.root.join("tuf")
    }

    pub fn blob_path(&self, hex: &str) -> PathBuf {
        self.blobs_dir().join("sha256").join(hex)
    }

    /// Pinned references of every app version present on the medium, read
    /// from the per-version `uri` files.
    pub fn found_app_uris(&self) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        // apps/<name>/<digest>/uri
        for entry in walkdir::WalkDir::new(self.apps_dir())
            .min_depth(3)
            .max_depth(3)
        {
            let entry = entry?;
            if !entry.file_type().is_file() || entry.file_name() != "uri" {
                continue;
            }
            let uri = fs::read_to_string(entry.path())?.trim().to_string();
            log::info!("found app; uri: {uri}");
            uris.push(uri);
        }
        Ok(uris)
    }

    /// Everything the medium offers: ostree commits named by the repo's
    /// refs plus the pinned app references.
    pub fn update_content(&self, refs: &dyn RefSource) -> Result<UpdateContent> {
        log::info!(
            "parsing a source ostree repo: {}",
            self.ostree_repo_dir().display()
        );
        let ostree_commits = refs.refs()?.into_values().collect();
        let app_uris = self.found_app_uris()?;
        Ok(UpdateContent {
            ostree_commits,
            app_uris,
        })
    }
}
