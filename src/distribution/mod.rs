//! Pull pinned artifacts from an OCI registry over a pluggable transport,
//! based on the [OCI distribution specification](https://github.com/opencontainers/distribution-spec).

mod auth;
mod client;
mod download;

pub use auth::{
    basic_auth_header, bearer_auth_header, BearerChallenge, AUTH_MATERIAL_MAX_SIZE,
    WWW_AUTHENTICATE,
};
pub use client::{RegistryClient, DEF_MANIFEST_MAX_SIZE};
pub use download::{DownloadContext, DownloadOutcome};
