use crate::digest::HashedDigest;
use crate::error::{Error, Result};
use std::fmt;
use url::Url;

/// A pinned OCI image reference.
///
/// The input must carry a registry host and a digest:
///
/// ```text
/// hub.example.io/acme/shellhttpd@sha256:e3b0c442…
/// ^^^^^^^^^^^^^^-------------------------------------- registry_host
///                ^^^^^^^^^^^^^^^--------------------- repo
///                ^^^^--------------------------------- factory
///                     ^^^^^^^^^^---------------------- app
///                                ^^^^^^^^^^^^^^^^^^^^- digest
/// ```
///
/// In factory mode the repo must consist of exactly two segments,
/// `<factory>/<app>`; plain image references may have any repo depth.
///
/// ```
/// use offline_update::Uri;
///
/// let uri = Uri::parse(
///     "hub.example.io/acme/shellhttpd@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
///     true,
/// ).unwrap();
/// assert_eq!(uri.registry_host, "hub.example.io");
/// assert_eq!(uri.repo, "acme/shellhttpd");
/// assert_eq!(uri.factory.as_deref(), Some("acme"));
/// assert_eq!(uri.app, "shellhttpd");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    pub registry_host: String,
    pub repo: String,
    pub factory: Option<String>,
    pub app: String,
    pub digest: HashedDigest,
}

impl Uri {
    pub fn parse(uri: &str, factory_app: bool) -> Result<Self> {
        let at_pos = uri
            .rfind('@')
            .ok_or_else(|| Error::BadUri(format!("digest/'@' not found in {uri}")))?;
        let slash_pos = uri
            .find('/')
            .ok_or_else(|| Error::BadUri(format!("image name/path not found in {uri}")))?;
        if at_pos <= slash_pos + 1 {
            return Err(Error::BadUri(format!(
                "image name/path not present before digest in {uri}"
            )));
        }

        let digest = HashedDigest::parse(&uri[at_pos + 1..])?;
        let registry_host = uri[..slash_pos].to_string();
        let repo = uri[slash_pos + 1..at_pos].to_string();

        let (factory, app) = match repo.rsplit_once('/') {
            Some((factory, app)) => (Some(factory.to_string()), app.to_string()),
            None => (None, repo.clone()),
        };

        if factory_app {
            match factory.as_deref() {
                Some(f) if !f.is_empty() && !f.contains('/') => {}
                _ => {
                    return Err(Error::BadUri(format!(
                        "factory image name must be <factory>/<repo>: {uri}"
                    )))
                }
            }
        }

        Ok(Uri {
            registry_host,
            repo,
            factory,
            app,
            digest,
        })
    }

    /// A copy of this reference pinned to another digest.
    pub fn rehash(&self, digest: HashedDigest) -> Self {
        Uri {
            digest,
            ..self.clone()
        }
    }

    /// Base URL of the distribution API endpoint for this reference.
    pub fn registry_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!("https://{}", self.registry_host))?)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.registry_host, self.repo, self.digest)
    }
}
