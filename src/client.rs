use crate::error::Result;
use crate::target::Target;

/// What the caller must do after a successful `install()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostInstallAction {
    /// A new deployment is staged; reboot to activate it.
    NeedReboot,
    /// Only apps changed; bounce the container runtime so it re-reads its
    /// repositories index.
    NeedDockerRestart,
}

/// Result code reported by the underlying installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallResult {
    Ok,
    /// Installation staged; completion happens after reboot.
    NeedCompletion,
    Failed,
}

/// The runtime update client the offline drivers orchestrate.
///
/// Implementations own TUF verification, the OSTree pull/deploy machinery
/// and app materialization; the drivers only sequence them against the
/// update medium.
pub trait UpdateClient {
    /// Refresh and verify the signed metadata. Must succeed before
    /// anything is installed.
    fn update_image_meta(&mut self) -> Result<()>;

    /// Verify the already-stored metadata without fetching.
    fn check_image_meta_offline(&mut self) -> Result<()>;

    /// Every signed target, as recorded in the verified metadata.
    fn all_targets(&self) -> &[Target];

    /// Hardware id of this device's primary ECU.
    fn hardware_id(&self) -> &str;

    /// Pull the target's ostree commit and materialize its apps.
    fn download(&mut self, target: &Target, reason: &str) -> Result<()>;

    fn install(&mut self, target: &Target) -> Result<InstallResult>;

    /// Post-reboot half of an install: swap the deployment and start apps.
    fn finalize_install(&mut self) -> Result<()>;

    /// Commit hash of the currently running deployment.
    fn current_commit(&self) -> Result<String>;

    fn is_target_active(&self, target: &Target) -> Result<bool>;
}
