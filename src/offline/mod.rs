//! Apply a signed update from a local medium: no registry, no metadata
//! server, no device gateway. Everything the update needs is on disk.

mod registry;

pub use registry::{OfflineRegistry, RegistryBasicAuthClient};

use crate::bundle::UpdateBundle;
use crate::client::{InstallResult, PostInstallAction, UpdateClient};
use crate::config::Config;
use crate::distribution::RegistryClient;
use crate::docker;
use crate::error::{Error, Result};
use crate::ostree::OstreeRepo;
use crate::target::{self, Target};
use crate::tuf::FileMetadataFetcher;
use crate::uri::Uri;

/// Where the update comes from.
pub struct UpdateSrc {
    pub bundle: UpdateBundle,
    /// Install this exact target instead of matching the medium contents.
    pub target_name: Option<String>,
}

/// Produces the `skopeo copy` source arguments for one app image.
pub type ImageSrcFn = Box<dyn Fn(&Uri, &str) -> Result<String>>;

/// Transport and metadata wiring an update client needs to apply a bundle
/// without network access.
pub struct OfflineBackend {
    /// Registry client answering every request from the bundle.
    pub registry: RegistryClient,
    /// Role files read from the bundle's `tuf/` directory.
    pub meta_fetcher: FileMetadataFetcher,
    /// OSTree remote pointing at the bundle's bare repository.
    pub ostree_remote: String,
    /// Source arguments handed to `skopeo` per app image.
    pub image_src: ImageSrcFn,
    pub docker_host: String,
}

/// Compose the offline backend for an update client.
///
/// The registry client is wired to the on-disk pseudo-registry through the
/// per-request transport factory, with the fixed-credentials stub standing
/// in for the device gateway.
pub fn wire_offline(cfg: &Config, src: &UpdateSrc) -> OfflineBackend {
    let offline = OfflineRegistry::new(src.bundle.clone(), &cfg.registry_host);

    let per_request = offline.clone();
    let registry = RegistryClient::new(
        Box::new(RegistryBasicAuthClient),
        "",
        Box::new(move |_headers, _observe| -> Box<dyn crate::http::HttpTransport> {
            Box::new(per_request.clone())
        }),
    );

    let blobs_dir = src.bundle.blobs_dir();
    let apps_dir = src.bundle.apps_dir();
    let image_src: ImageSrcFn = Box::new(move |app_uri, image_uri| {
        let image = Uri::parse(image_uri, false)?;
        Ok(format!(
            "--src-shared-blob-dir {} oci:{}/{}/{}/images/{}/{}/{}",
            blobs_dir.display(),
            apps_dir.display(),
            app_uri.app,
            app_uri.digest.hex(),
            image.registry_host,
            image.repo,
            image.digest.hex()
        ))
    });

    OfflineBackend {
        registry,
        meta_fetcher: FileMetadataFetcher::new(src.bundle.tuf_dir()),
        ostree_remote: format!("file://{}", src.bundle.ostree_repo_dir().display()),
        image_src,
        docker_host: cfg.docker_host.clone(),
    }
}

fn get_target(
    client: &dyn UpdateClient,
    src: &UpdateSrc,
    action: &'static str,
) -> Result<Target> {
    if let Some(name) = &src.target_name {
        return target::find_target(client.all_targets(), name)
            .cloned()
            .ok_or(Error::TargetNotFound { action });
    }
    let repo = OstreeRepo::new(src.bundle.ostree_repo_dir());
    let content = src.bundle.update_content(&repo)?;
    target::select_target(client.all_targets(), client.hardware_id(), &content)
        .ok_or(Error::TargetNotFound { action })
}

/// First phase of an offline update.
///
/// Verifies the bundled metadata, picks the target the medium satisfies,
/// downloads it, registers the app images with the container runtime and
/// stages the OSTree deployment. The returned action tells the caller
/// whether a reboot or only a runtime restart is due.
pub fn install(
    client: &mut dyn UpdateClient,
    cfg: &Config,
    src: &UpdateSrc,
) -> Result<PostInstallAction> {
    client
        .update_image_meta()
        .map_err(|e| Error::TufPullFailed(e.to_string()))?;

    let target = get_target(&*client, src, "install")?;
    log::info!(
        "found target that matches the given update content: {}",
        target.name
    );

    client.download(&target, &format!("offline update to {}", target.name))?;
    docker::register_apps(&target, &cfg.reset_apps_root, &cfg.images_data_root)?;

    if client.current_commit()? == target.sha256 {
        // only apps changed; the runtime must re-read its repositories
        // index before they start
        return Ok(PostInstallAction::NeedDockerRestart);
    }
    match client.install(&target)? {
        InstallResult::NeedCompletion => Ok(PostInstallAction::NeedReboot),
        result => Err(Error::InstallFailed(format!(
            "unexpected result code installing {}: {result:?}",
            target.name
        ))),
    }
}

/// Second phase, after the post-install reboot (or runtime restart).
///
/// Finalizes the staged deployment when the booted commit still differs
/// from the target. Otherwise the apps are fetched and installed once more
/// (the app manager only re-syncs its state through a download pass). The
/// target must come up active either way.
pub fn run(client: &mut dyn UpdateClient, src: &UpdateSrc) -> Result<()> {
    client
        .check_image_meta_offline()
        .map_err(|e| Error::TufInvalidOffline(e.to_string()))?;

    let target = get_target(&*client, src, "run")?;

    if client.current_commit()? != target.sha256 {
        client.finalize_install()?;
    } else {
        client.download(&target, &format!("offline update of {}", target.name))?;
        client.install(&target)?;
    }

    if !client.is_target_active(&target)? {
        return Err(Error::InstallFailed(format!(
            "the installed target is not running: {}",
            target.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::AppRef;
    use maplit::btreemap;
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;

    const APP_HEX: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const IMG_HEX: &str = "1111111111111111111111111111111111111111111111111111111111111111";

    fn app_uri() -> String {
        format!("hub.example.io/acme/app-01@sha256:{APP_HEX}")
    }

    /// Medium carrying commit `c1` and one version of `app-01`.
    fn seed_bundle(root: &Path) {
        let heads = root.join("ostree/refs/heads");
        fs::create_dir_all(&heads).unwrap();
        fs::write(heads.join("main"), "c1").unwrap();
        let app_dir = root.join("apps/app-01").join(APP_HEX);
        fs::create_dir_all(&app_dir).unwrap();
        fs::write(app_dir.join("uri"), app_uri()).unwrap();
    }

    fn matching_target() -> Target {
        Target::new(
            "lmp-10",
            "c1",
            vec!["intel-corei7-64".to_string()],
            "10",
            btreemap! { "app-01".to_string() => AppRef { uri: app_uri() } },
        )
    }

    fn cfg_for(docker_root: &Path, store_root: &Path) -> Config {
        Config {
            apps_root: store_root.join("compose-apps"),
            reset_apps_root: store_root.to_path_buf(),
            images_data_root: docker_root.to_path_buf(),
            skopeo_bin: "/usr/bin/skopeo".into(),
            compose_bin: "/usr/bin/docker-compose".into(),
            docker_host: "unix:///var/run/docker.sock".to_string(),
            registry_host: "hub.example.io".to_string(),
        }
    }

    struct FakeClient {
        targets: Vec<Target>,
        current: String,
        install_result: InstallResult,
        active: bool,
        meta_ok: bool,
        calls: RefCell<Vec<&'static str>>,
    }

    impl FakeClient {
        fn new(targets: Vec<Target>, current: &str) -> Self {
            Self {
                targets,
                current: current.to_string(),
                install_result: InstallResult::NeedCompletion,
                active: true,
                meta_ok: true,
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.borrow().clone()
        }
    }

    impl UpdateClient for FakeClient {
        fn update_image_meta(&mut self) -> Result<()> {
            self.calls.borrow_mut().push("update_image_meta");
            if self.meta_ok {
                Ok(())
            } else {
                Err(Error::MetadataFetch {
                    role: "targets".to_string(),
                    reason: "missing role file".to_string(),
                })
            }
        }

        fn check_image_meta_offline(&mut self) -> Result<()> {
            self.calls.borrow_mut().push("check_image_meta_offline");
            if self.meta_ok {
                Ok(())
            } else {
                Err(Error::MetadataFetch {
                    role: "root".to_string(),
                    reason: "missing role file".to_string(),
                })
            }
        }

        fn all_targets(&self) -> &[Target] {
            &self.targets
        }

        fn hardware_id(&self) -> &str {
            "intel-corei7-64"
        }

        fn download(&mut self, _target: &Target, _reason: &str) -> Result<()> {
            self.calls.borrow_mut().push("download");
            Ok(())
        }

        fn install(&mut self, _target: &Target) -> Result<InstallResult> {
            self.calls.borrow_mut().push("install");
            Ok(self.install_result)
        }

        fn finalize_install(&mut self) -> Result<()> {
            self.calls.borrow_mut().push("finalize_install");
            Ok(())
        }

        fn current_commit(&self) -> Result<String> {
            Ok(self.current.clone())
        }

        fn is_target_active(&self, _target: &Target) -> Result<bool> {
            Ok(self.active)
        }
    }

    fn src_for(bundle_root: &Path) -> UpdateSrc {
        UpdateSrc {
            bundle: UpdateBundle::new(bundle_root),
            target_name: None,
        }
    }

    #[test]
    fn install_stages_a_new_deployment() {
        let bundle = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        seed_bundle(bundle.path());

        let mut client = FakeClient::new(vec![matching_target()], "c0");
        let action = install(
            &mut client,
            &cfg_for(docker.path(), store.path()),
            &src_for(bundle.path()),
        )
        .unwrap();

        assert_eq!(action, PostInstallAction::NeedReboot);
        assert_eq!(client.calls(), vec!["update_image_meta", "download", "install"]);
        // the registrar ran and persisted the runtime's index
        assert!(docker.path().join(docker::REPOSITORIES_FILE).exists());
    }

    #[test]
    fn install_on_the_running_commit_needs_a_runtime_restart() {
        let bundle = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        seed_bundle(bundle.path());

        let mut client = FakeClient::new(vec![matching_target()], "c1");
        let action = install(
            &mut client,
            &cfg_for(docker.path(), store.path()),
            &src_for(bundle.path()),
        )
        .unwrap();

        assert_eq!(action, PostInstallAction::NeedDockerRestart);
        assert_eq!(client.calls(), vec!["update_image_meta", "download"]);
    }

    #[test]
    fn install_requires_need_completion() {
        let bundle = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        seed_bundle(bundle.path());

        let mut client = FakeClient::new(vec![matching_target()], "c0");
        client.install_result = InstallResult::Failed;
        assert!(matches!(
            install(
                &mut client,
                &cfg_for(docker.path(), store.path()),
                &src_for(bundle.path()),
            ),
            Err(Error::InstallFailed(_))
        ));
    }

    #[test]
    fn install_wraps_metadata_failures() {
        let bundle = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        seed_bundle(bundle.path());

        let mut client = FakeClient::new(vec![matching_target()], "c0");
        client.meta_ok = false;
        assert!(matches!(
            install(
                &mut client,
                &cfg_for(docker.path(), store.path()),
                &src_for(bundle.path()),
            ),
            Err(Error::TufPullFailed(_))
        ));
        assert_eq!(client.calls(), vec!["update_image_meta"]);
    }

    #[test]
    fn install_fails_without_a_matching_target() {
        let bundle = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        seed_bundle(bundle.path());

        // the only signed target names a commit the medium does not carry
        let mut stray = matching_target();
        stray.sha256 = "c9".to_string();
        let mut client = FakeClient::new(vec![stray], "c0");
        assert!(matches!(
            install(
                &mut client,
                &cfg_for(docker.path(), store.path()),
                &src_for(bundle.path()),
            ),
            Err(Error::TargetNotFound { action: "install" })
        ));
    }

    #[test]
    fn install_by_name_bypasses_selection() {
        let bundle = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        // no bundle content seeded: named selection never scans the medium

        let mut target = matching_target();
        target.apps.clear();
        let mut client = FakeClient::new(vec![target], "c0");
        let mut src = src_for(bundle.path());
        src.target_name = Some("lmp-10".to_string());

        let action = install(
            &mut client,
            &cfg_for(docker.path(), store.path()),
            &src,
        )
        .unwrap();
        assert_eq!(action, PostInstallAction::NeedReboot);
    }

    #[test]
    fn run_finalizes_a_staged_deployment() {
        let bundle = tempfile::tempdir().unwrap();
        seed_bundle(bundle.path());

        let mut client = FakeClient::new(vec![matching_target()], "c0");
        run(&mut client, &src_for(bundle.path())).unwrap();
        assert_eq!(
            client.calls(),
            vec!["check_image_meta_offline", "finalize_install"]
        );
    }

    #[test]
    fn run_on_the_booted_commit_redownloads_apps() {
        let bundle = tempfile::tempdir().unwrap();
        seed_bundle(bundle.path());

        let mut client = FakeClient::new(vec![matching_target()], "c1");
        run(&mut client, &src_for(bundle.path())).unwrap();
        assert_eq!(
            client.calls(),
            vec!["check_image_meta_offline", "download", "install"]
        );
    }

    #[test]
    fn run_requires_the_target_to_be_active() {
        let bundle = tempfile::tempdir().unwrap();
        seed_bundle(bundle.path());

        let mut client = FakeClient::new(vec![matching_target()], "c0");
        client.active = false;
        assert!(matches!(
            run(&mut client, &src_for(bundle.path())),
            Err(Error::InstallFailed(_))
        ));
    }

    #[test]
    fn run_wraps_offline_metadata_failures() {
        let bundle = tempfile::tempdir().unwrap();
        seed_bundle(bundle.path());

        let mut client = FakeClient::new(vec![matching_target()], "c0");
        client.meta_ok = false;
        assert!(matches!(
            run(&mut client, &src_for(bundle.path())),
            Err(Error::TufInvalidOffline(_))
        ));
    }

    #[test]
    fn backend_composes_skopeo_source_arguments() {
        let bundle = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();

        let backend = wire_offline(
            &cfg_for(docker.path(), store.path()),
            &src_for(bundle.path()),
        );

        let app = Uri::parse(&app_uri(), true).unwrap();
        let image = format!("hub.example.io/acme/httpd@sha256:{IMG_HEX}");
        let args = (backend.image_src)(&app, &image).unwrap();
        let root = bundle.path().display();
        assert_eq!(
            args,
            format!(
                "--src-shared-blob-dir {root}/blobs oci:{root}/apps/app-01/{APP_HEX}/images/hub.example.io/acme/httpd/{IMG_HEX}"
            )
        );
        assert_eq!(
            backend.ostree_remote,
            format!("file://{root}/ostree")
        );
    }

    #[test]
    fn backend_registry_serves_manifests_from_the_bundle() {
        let bundle = tempfile::tempdir().unwrap();
        let docker = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();

        // pin a manifest into the bundle's blob store
        let body = br#"{"schemaVersion":2}"#.to_vec();
        let digest = crate::HashedDigest::of_buf(&body);
        let blobs = bundle.path().join("blobs/sha256");
        fs::create_dir_all(&blobs).unwrap();
        fs::write(blobs.join(digest.hex()), &body).unwrap();

        let backend = wire_offline(
            &cfg_for(docker.path(), store.path()),
            &src_for(bundle.path()),
        );
        let uri = Uri::parse(&format!("hub.example.io/acme/app-01@{digest}"), true).unwrap();
        let manifest = backend
            .registry
            .get_app_manifest(
                &uri,
                "application/vnd.oci.image.manifest.v1+json",
                Some(body.len() as u64),
            )
            .unwrap();
        assert_eq!(manifest, body);
    }
}
