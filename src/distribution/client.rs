use crate::digest::HashedDigest;
use crate::distribution::auth::{self, BearerChallenge, WWW_AUTHENTICATE};
use crate::distribution::download::DownloadContext;
use crate::error::{Error, Result};
use crate::http::{HttpResponse, HttpTransport, TransportFactory};
use crate::uri::Uri;
use std::fs;
use std::path::Path;

/// Size cap applied to manifest fetches with no pinned size.
pub const DEF_MANIFEST_MAX_SIZE: u64 = 1024 * 1024;

/// A client for the `/v2/<repo>/` registry API.
///
/// Stateless across calls: the transport factory is invoked once per
/// request and no token is cached. Exactly one retry is permitted per call,
/// and only to answer a 401 with a fresh bearer token; a second 401 is
/// fatal.
pub struct RegistryClient {
    daemon: Box<dyn HttpTransport>,
    creds_endpoint: String,
    factory: TransportFactory,
}

fn manifest_url(uri: &Uri) -> Result<String> {
    Ok(format!(
        "{}v2/{}/manifests/{}",
        uri.registry_url()?,
        uri.repo,
        uri.digest
    ))
}

fn blob_url(uri: &Uri) -> Result<String> {
    Ok(format!(
        "{}v2/{}/blobs/{}",
        uri.registry_url()?,
        uri.repo,
        uri.digest
    ))
}

impl RegistryClient {
    /// `daemon` serves the credentials endpoint; `factory` builds the
    /// per-request transport facing the registry itself.
    pub fn new(
        daemon: Box<dyn HttpTransport>,
        creds_endpoint: impl Into<String>,
        factory: TransportFactory,
    ) -> Self {
        Self {
            daemon,
            creds_endpoint: creds_endpoint.into(),
            factory,
        }
    }

    pub fn with_default_transport(
        daemon: Box<dyn HttpTransport>,
        creds_endpoint: impl Into<String>,
    ) -> Self {
        Self::new(daemon, creds_endpoint, crate::http::default_transport_factory())
    }

    /// Fetch an app manifest pinned by `uri`.
    ///
    /// The body must hash to the pinned digest, and its length must equal
    /// `expected_size` when given, or stay under [DEF_MANIFEST_MAX_SIZE]
    /// otherwise.
    pub fn get_app_manifest(
        &self,
        uri: &Uri,
        format: &str,
        expected_size: Option<u64>,
    ) -> Result<Vec<u8>> {
        let url = manifest_url(uri)?;
        log::debug!("downloading app manifest: {url}");
        let max_size = expected_size.unwrap_or(DEF_MANIFEST_MAX_SIZE);

        let mut headers = vec![("accept".to_string(), format.to_string())];
        let observe = [WWW_AUTHENTICATE];
        let mut resp = (self.factory)(&headers, &observe).get(&url, max_size)?;
        if resp.status == 401 {
            headers.push(self.answer_challenge(&resp, &url)?);
            resp = (self.factory)(&headers, &observe).get(&url, max_size)?;
        }
        if !resp.is_ok() {
            return Err(Error::Transport {
                url,
                status: resp.status,
            });
        }

        let got = resp.body.len() as u64;
        match expected_size {
            Some(want) if got != want => {
                return Err(Error::SizeMismatch {
                    artifact: uri.to_string(),
                    got,
                    want,
                })
            }
            None if got > max_size => {
                return Err(Error::SizeMismatch {
                    artifact: uri.to_string(),
                    got,
                    want: max_size,
                })
            }
            _ => {}
        }

        let received = HashedDigest::of_buf(&resp.body);
        if received != uri.digest {
            return Err(Error::DigestMismatch {
                artifact: uri.to_string(),
                got: received.hex().to_string(),
                want: uri.digest.hex().to_string(),
            });
        }
        Ok(resp.body)
    }

    /// Download the blob pinned by `uri` into `path`.
    ///
    /// The bytes are written, hashed and size-guarded in a single pass; on
    /// any failure the partial file is removed before the error is raised.
    pub fn download_blob(&self, uri: &Uri, path: &Path, expected_size: u64) -> Result<()> {
        let url = blob_url(uri)?;
        log::debug!("downloading app blob: {url}");

        let out = fs::File::create(path)?;
        let mut ctx = DownloadContext::new(out, expected_size, uri.to_string());
        let transfer = self.fetch_blob(&url, &mut ctx);
        let outcome = ctx.finish();

        let verdict = match transfer {
            Ok(resp) if resp.is_ok() => {
                if outcome.written != expected_size {
                    Err(Error::SizeMismatch {
                        artifact: uri.to_string(),
                        got: outcome.written,
                        want: expected_size,
                    })
                } else if outcome.digest_hex != uri.digest.hex() {
                    Err(Error::DigestMismatch {
                        artifact: uri.to_string(),
                        got: outcome.digest_hex,
                        want: uri.digest.hex().to_string(),
                    })
                } else {
                    Ok(())
                }
            }
            Ok(resp) => Err(Error::Transport {
                url,
                status: resp.status,
            }),
            Err(Error::DownloadAborted { .. }) => {
                Err(outcome.failure.unwrap_or(Error::SizeMismatch {
                    artifact: uri.to_string(),
                    got: outcome.received,
                    want: expected_size,
                }))
            }
            Err(e) => Err(e),
        };

        if verdict.is_err() {
            let _ = fs::remove_file(path);
        }
        verdict
    }

    fn fetch_blob(&self, url: &str, ctx: &mut DownloadContext<fs::File>) -> Result<HttpResponse> {
        let observe = [WWW_AUTHENTICATE];
        let mut headers: Vec<(String, String)> = Vec::new();
        let resp = (self.factory)(&headers, &observe).download(url, ctx)?;
        if resp.status != 401 {
            return Ok(resp);
        }
        headers.push(self.answer_challenge(&resp, url)?);
        ctx.reset()?;
        (self.factory)(&headers, &observe).download(url, ctx)
    }

    fn answer_challenge(&self, resp: &HttpResponse, url: &str) -> Result<(String, String)> {
        let header = resp.headers.get(WWW_AUTHENTICATE).ok_or_else(|| {
            Error::AuthFailed(format!(
                "no `{WWW_AUTHENTICATE}` header in the 401 response from {url}"
            ))
        })?;
        let challenge = BearerChallenge::parse(header)?;
        auth::bearer_auth_header(
            self.daemon.as_ref(),
            &self.creds_endpoint,
            &self.factory,
            &challenge,
        )
    }
}
