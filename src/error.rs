use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Invalid references and digests
    //
    #[error("invalid uri: {0}")]
    BadUri(String),
    #[error("unsupported hash type: {0}")]
    UnsupportedHash(String),
    #[error("invalid hash length: {0}")]
    BadHashLength(String),
    #[error("invalid hash encoding: {0}")]
    BadHash(String),
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),

    //
    // Registry access
    //
    #[error("invalid bearer challenge: {0}")]
    BadBearerChallenge(String),
    #[error("registry authentication failed: {0}")]
    AuthFailed(String),
    #[error("request to {url} failed with status {status}")]
    Transport { url: String, status: u16 },
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },
    #[error("transfer of {url} aborted by the write sink")]
    DownloadAborted { url: String },
    #[error("size mismatch for {artifact}: {got} != {want}")]
    SizeMismatch {
        artifact: String,
        got: u64,
        want: u64,
    },
    #[error("digest mismatch for {artifact}: {got} != {want}")]
    DigestMismatch {
        artifact: String,
        got: String,
        want: String,
    },

    //
    // Update content
    //
    #[error("no manifests in image index: {0}")]
    MissingManifest(PathBuf),
    #[error("service {0} has no image reference")]
    MissingImage(String),
    #[error(transparent)]
    InvalidJson(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidYaml(#[from] serde_yaml::Error),

    //
    // Update flow
    //
    #[error("failed to fetch TUF role {role}: {reason}")]
    MetadataFetch { role: String, reason: String },
    #[error("failed to pull TUF metadata: {0}")]
    TufPullFailed(String),
    #[error("invalid local TUF metadata: {0}")]
    TufInvalidOffline(String),
    #[error("target to {action} has not been found")]
    TargetNotFound { action: &'static str },
    #[error("failed to install target: {0}")]
    InstallFailed(String),

    //
    // System
    //
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        Self::Io(e.into())
    }
}

impl From<oci_spec::OciSpecError> for Error {
    fn from(e: oci_spec::OciSpecError) -> Self {
        match e {
            oci_spec::OciSpecError::SerDe(e) => Error::InvalidJson(e),
            oci_spec::OciSpecError::Io(e) => Error::Io(e),
            oci_spec::OciSpecError::Builder(_) => unreachable!(),
            oci_spec::OciSpecError::Other(e) => panic!("unknown error within oci_spec: {e}"),
        }
    }
}
