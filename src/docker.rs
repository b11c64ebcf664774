use crate::compose::{ComposeInfo, COMPOSE_FILE};
use crate::digest::HashedDigest;
use crate::error::{Error, Result};
use crate::target::Target;
use crate::uri::Uri;
use oci_spec::image::{ImageIndex, ImageManifest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Location of the repositories index under the runtime's data root.
pub const REPOSITORIES_FILE: &str = "image/overlay2/repositories.json";

/// The container runtime's map of known image references to local config
/// digests, read by the daemon on start.
///
/// The runtime cannot pull anything while offline, but it will start a
/// container whose pinned reference already appears here pointing at
/// materialized layers. Splicing entries in is what makes locally
/// extracted images visible without the normal pull path.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoriesIndex {
    #[serde(rename = "Repositories")]
    repositories: BTreeMap<String, BTreeMap<String, String>>,
}

impl RepositoriesIndex {
    fn path(docker_root: &Path) -> PathBuf {
        docker_root.join(REPOSITORIES_FILE)
    }

    /// Load the runtime's index, or start an empty one if the runtime has
    /// never written it.
    pub fn load(docker_root: &Path) -> Result<Self> {
        let path = Self::path(docker_root);
        if path.exists() {
            Ok(serde_json::from_slice(&fs::read(path)?)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn insert(&mut self, repo: &str, pinned_ref: &str, config_digest: &str) {
        self.repositories
            .entry(repo.to_string())
            .or_default()
            .insert(pinned_ref.to_string(), config_digest.to_string());
    }

    /// Persist through a temp file and rename so a crash never leaves a
    /// truncated index behind.
    pub fn store(&self, docker_root: &Path) -> Result<()> {
        let path = Self::path(docker_root);
        fs::create_dir_all(path.parent().unwrap())?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(self)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Make every image of the target's apps known to the container runtime.
///
/// For each app present under the store, each compose service's pinned
/// image is resolved through its OCI image index to the image config
/// digest, and the pair is spliced into the repositories index. Apps that
/// were shortlisted off the medium have no store directory and are
/// skipped. The runtime must not be running while its index is edited;
/// the caller bounces the daemon around this.
pub fn register_apps(target: &Target, apps_store_root: &Path, docker_root: &Path) -> Result<()> {
    let mut index = RepositoriesIndex::load(docker_root)?;

    for app in target.apps.values() {
        let app_uri = Uri::parse(&app.uri, true)?;
        let app_dir = apps_store_root
            .join("apps")
            .join(&app_uri.app)
            .join(app_uri.digest.hex());
        if !app_dir.exists() {
            continue;
        }

        let compose = ComposeInfo::load(&app_dir.join(COMPOSE_FILE))?;
        for (_service, image) in compose.images()? {
            let image_uri = Uri::parse(image, false)?;

            let image_index_path = app_dir
                .join("images")
                .join(&image_uri.registry_host)
                .join(&image_uri.repo)
                .join(image_uri.digest.hex())
                .join("index.json");
            let image_index = ImageIndex::from_reader(fs::File::open(&image_index_path)?)?;
            // multi-arch indices are not handled; only the first manifest is read
            let manifest_digest = image_index
                .manifests()
                .first()
                .map(|m| m.digest().to_string())
                .ok_or_else(|| Error::MissingManifest(image_index_path.clone()))?;
            let manifest_digest = HashedDigest::parse(&manifest_digest)?;

            let manifest_path = apps_store_root
                .join("blobs/sha256")
                .join(manifest_digest.hex());
            let manifest = ImageManifest::from_reader(fs::File::open(manifest_path)?)?;
            let config_digest = HashedDigest::parse(&manifest.config().digest().to_string())?;

            let repo = format!("{}/{}", image_uri.registry_host, image_uri.repo);
            log::info!("registering image: {image} -> {config_digest}");
            index.insert(&repo, image, &config_digest.to_string());
        }
    }

    index.store(docker_root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::AppRef;
    use maplit::btreemap;

    const APP_HEX: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const IMG_HEX: &str = "1111111111111111111111111111111111111111111111111111111111111111";
    const MAN_HEX: &str = "2222222222222222222222222222222222222222222222222222222222222222";
    const CFG_HEX: &str = "3333333333333333333333333333333333333333333333333333333333333333";

    fn image_uri() -> String {
        format!("hub.example.io/acme/httpd@sha256:{IMG_HEX}")
    }

    /// One app with one service, wired through index.json and the manifest
    /// blob to a config digest.
    fn seed_store(store: &Path) {
        let app_dir = store.join("apps/app-01").join(APP_HEX);
        fs::create_dir_all(&app_dir).unwrap();
        fs::write(
            app_dir.join(COMPOSE_FILE),
            format!("services:\n  httpd:\n    image: {}\n", image_uri()),
        )
        .unwrap();

        let index_dir = app_dir.join("images/hub.example.io/acme/httpd").join(IMG_HEX);
        fs::create_dir_all(&index_dir).unwrap();
        fs::write(
            index_dir.join("index.json"),
            format!(
                r#"{{"schemaVersion":2,"manifests":[{{"mediaType":"application/vnd.oci.image.manifest.v1+json","digest":"sha256:{MAN_HEX}","size":428}}]}}"#
            ),
        )
        .unwrap();

        let blobs = store.join("blobs/sha256");
        fs::create_dir_all(&blobs).unwrap();
        fs::write(
            blobs.join(MAN_HEX),
            format!(
                r#"{{"schemaVersion":2,"config":{{"mediaType":"application/vnd.oci.image.config.v1+json","digest":"sha256:{CFG_HEX}","size":7}},"layers":[]}}"#
            ),
        )
        .unwrap();
    }

    fn app_target() -> Target {
        Target::new(
            "lmp-10",
            "c1",
            vec!["intel-corei7-64".to_string()],
            "10",
            btreemap! {
                "app-01".to_string() => AppRef {
                    uri: format!("hub.example.io/acme/app-01@sha256:{APP_HEX}"),
                },
            },
        )
    }

    #[test]
    fn splices_config_digest_into_the_index() {
        let store = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        seed_store(store.path());

        register_apps(&app_target(), store.path(), docker.path()).unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(docker.path().join(REPOSITORIES_FILE)).unwrap())
                .unwrap();
        assert_eq!(
            written["Repositories"]["hub.example.io/acme/httpd"][image_uri()],
            format!("sha256:{CFG_HEX}")
        );
    }

    #[test]
    fn registration_is_idempotent() {
        let store = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        seed_store(store.path());

        register_apps(&app_target(), store.path(), docker.path()).unwrap();
        let first = fs::read(docker.path().join(REPOSITORIES_FILE)).unwrap();
        register_apps(&app_target(), store.path(), docker.path()).unwrap();
        let second = fs::read(docker.path().join(REPOSITORIES_FILE)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn keeps_existing_entries() {
        let store = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        seed_store(store.path());

        let mut existing = RepositoriesIndex::default();
        existing.insert("other/repo", "other/repo@sha256:ee", "sha256:ff");
        existing.store(docker.path()).unwrap();

        register_apps(&app_target(), store.path(), docker.path()).unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(docker.path().join(REPOSITORIES_FILE)).unwrap())
                .unwrap();
        assert_eq!(written["Repositories"]["other/repo"]["other/repo@sha256:ee"], "sha256:ff");
        assert_eq!(
            written["Repositories"]["hub.example.io/acme/httpd"][image_uri()],
            format!("sha256:{CFG_HEX}")
        );
    }

    #[test]
    fn shortlisted_apps_without_a_store_dir_are_skipped() {
        let store = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        // nothing materialized under the store

        register_apps(&app_target(), store.path(), docker.path()).unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(docker.path().join(REPOSITORIES_FILE)).unwrap())
                .unwrap();
        assert_eq!(written, serde_json::json!({"Repositories": {}}));
    }

    #[test]
    fn empty_image_index_is_an_error() {
        let store = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        seed_store(store.path());
        let index_path = store
            .path()
            .join("apps/app-01")
            .join(APP_HEX)
            .join("images/hub.example.io/acme/httpd")
            .join(IMG_HEX)
            .join("index.json");
        fs::write(&index_path, r#"{"schemaVersion":2,"manifests":[]}"#).unwrap();

        assert!(matches!(
            register_apps(&app_target(), store.path(), docker.path()),
            Err(Error::MissingManifest(_))
        ));
    }
}
