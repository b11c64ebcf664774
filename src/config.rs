use std::env;
use std::path::PathBuf;

pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Package-manager configuration, resolved once at construction.
///
/// Nothing here is read from the environment afterwards; in particular the
/// container runtime socket honors `DOCKER_HOST` only when the config is
/// built.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the compose projects the runtime starts.
    pub apps_root: PathBuf,
    /// Store the app archives are materialized into.
    pub reset_apps_root: PathBuf,
    /// Container runtime data root, holding the repositories index.
    pub images_data_root: PathBuf,
    pub skopeo_bin: PathBuf,
    pub compose_bin: PathBuf,
    pub docker_host: String,
    /// Hostname the offline registry answers for, used to shape its
    /// token-auth endpoint.
    pub registry_host: String,
}

impl Config {
    pub fn new(
        apps_root: impl Into<PathBuf>,
        reset_apps_root: impl Into<PathBuf>,
        images_data_root: impl Into<PathBuf>,
        registry_host: impl Into<String>,
    ) -> Self {
        Self {
            apps_root: apps_root.into(),
            reset_apps_root: reset_apps_root.into(),
            images_data_root: images_data_root.into(),
            skopeo_bin: PathBuf::from("/usr/bin/skopeo"),
            compose_bin: PathBuf::from("/usr/bin/docker-compose"),
            docker_host: docker_host_from_env(),
            registry_host: registry_host.into(),
        }
    }
}

/// The runtime socket, from `DOCKER_HOST` when set.
pub fn docker_host_from_env() -> String {
    env::var("DOCKER_HOST").unwrap_or_else(|_| DEFAULT_DOCKER_HOST.to_string())
}
