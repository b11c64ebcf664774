use crate::bundle::UpdateBundle;
use crate::digest::DIGEST_PREFIX;
use crate::error::{Error, Result};
use crate::http::{ChunkSink, HttpResponse, HttpTransport, DOWNLOAD_CHUNK_SIZE};
use std::fs;
use std::io::Read;
use std::path::PathBuf;

/// Registry served from the update medium.
///
/// Answers the same HTTP contract the online registry client consumes, but
/// every artifact comes from the bundle's content-addressed blob store: the
/// digest embedded in the request URL names the file. Token-auth requests
/// are short-circuited with a fixed token, and anything else answers
/// `501 Not Implemented` through the transport defaults.
#[derive(Clone)]
pub struct OfflineRegistry {
    bundle: UpdateBundle,
    auth_endpoint: String,
}

impl OfflineRegistry {
    pub fn new(bundle: UpdateBundle, hostname: &str) -> Self {
        Self {
            auth_endpoint: format!("https://{hostname}/token-auth"),
            bundle,
        }
    }

    pub fn bundle(&self) -> &UpdateBundle {
        &self.bundle
    }

    /// Blob file named by the last `sha256:` marker in the URL. The hex is
    /// used as a bare file name under the blob store, never as a path.
    fn blob_for(&self, url: &str) -> Option<PathBuf> {
        let pos = url.rfind(DIGEST_PREFIX)?;
        let hex = &url[pos + DIGEST_PREFIX.len()..];
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(self.bundle.blob_path(hex))
    }
}

impl HttpTransport for OfflineRegistry {
    fn get(&self, url: &str, _max_size: u64) -> Result<HttpResponse> {
        if url.starts_with(&self.auth_endpoint) {
            return Ok(HttpResponse::new(200, &br#"{"token":"token"}"#[..]));
        }
        match self.blob_for(url) {
            Some(path) => Ok(HttpResponse::new(200, fs::read(path)?)),
            None => Ok(HttpResponse::new(400, &b"Invalid URL"[..])),
        }
    }

    fn download(&self, url: &str, sink: &mut dyn ChunkSink) -> Result<HttpResponse> {
        let path = match self.blob_for(url) {
            Some(path) => path,
            None => return Ok(HttpResponse::new(400, &b"Invalid URL"[..])),
        };
        let mut blob = fs::File::open(path)?;
        let mut buf = [0u8; DOWNLOAD_CHUNK_SIZE];
        loop {
            let n = blob.read(&mut buf)?;
            if n == 0 {
                break;
            }
            if sink.accept(&buf[..n]) != n {
                return Err(Error::DownloadAborted {
                    url: url.to_string(),
                });
            }
        }
        Ok(HttpResponse::new(200, Vec::new()))
    }
}

/// Stand-in for the device-gateway credentials endpoint: offline there is
/// nobody to ask, so fixed credentials satisfy the auth flow.
#[derive(Clone, Copy, Default)]
pub struct RegistryBasicAuthClient;

impl HttpTransport for RegistryBasicAuthClient {
    fn get(&self, _url: &str, _max_size: u64) -> Result<HttpResponse> {
        Ok(HttpResponse::new(
            200,
            &br#"{"Secret":"secret","Username":"test-user"}"#[..],
        ))
    }
}
