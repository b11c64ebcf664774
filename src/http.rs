use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::Read;

/// Read buffer size for streamed transfers.
pub const DOWNLOAD_CHUNK_SIZE: usize = 4 * 1024;

/// Plain view of an HTTP exchange outcome.
///
/// `headers` carries only the response headers the caller asked the
/// transport to observe, keyed by lowercase name.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    pub fn not_implemented() -> Self {
        Self::new(501, Vec::new())
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Receiver side of a streamed transfer.
///
/// `accept` returns the number of bytes taken from the chunk; returning any
/// value other than `chunk.len()` instructs the transport to abort the
/// transfer. This is the sole error-propagation channel from the sink back
/// to the transport.
pub trait ChunkSink {
    fn accept(&mut self, chunk: &[u8]) -> usize;
}

/// The transport capability set consumed by the registry client.
///
/// Implementations override what they support; everything else answers
/// `501 Not Implemented`.
pub trait HttpTransport {
    fn get(&self, url: &str, max_size: u64) -> Result<HttpResponse> {
        let _ = (url, max_size);
        Ok(HttpResponse::not_implemented())
    }

    fn post(&self, url: &str, body: &[u8]) -> Result<HttpResponse> {
        let _ = (url, body);
        Ok(HttpResponse::not_implemented())
    }

    fn put(&self, url: &str, body: &[u8]) -> Result<HttpResponse> {
        let _ = (url, body);
        Ok(HttpResponse::not_implemented())
    }

    /// Stream the response body into `sink`. The returned response carries
    /// status and observed headers only; the body went through the sink.
    fn download(&self, url: &str, sink: &mut dyn ChunkSink) -> Result<HttpResponse> {
        let _ = (url, sink);
        Ok(HttpResponse::not_implemented())
    }
}

/// Per-request transport constructor.
///
/// Called once per request with the request headers to attach and the
/// response header names to observe, so substitutes can stay single-purpose
/// and stateless.
pub type TransportFactory =
    Box<dyn Fn(&[(String, String)], &[&str]) -> Box<dyn HttpTransport>>;

/// `ureq`-backed transport for a real HTTPS registry.
pub struct UreqTransport {
    agent: ureq::Agent,
    headers: Vec<(String, String)>,
    observe: Vec<String>,
}

impl UreqTransport {
    pub fn new(headers: &[(String, String)], observe: &[&str]) -> Self {
        Self {
            agent: ureq::Agent::new(),
            headers: headers.to_vec(),
            observe: observe.iter().map(|h| h.to_lowercase()).collect(),
        }
    }

    fn call(&self, url: &str) -> Result<ureq::Response> {
        let mut req = self.agent.get(url);
        for (name, value) in &self.headers {
            req = req.set(name, value);
        }
        match req.call() {
            Ok(resp) => Ok(resp),
            // a non-2xx answer is still a response the caller inspects
            Err(ureq::Error::Status(_, resp)) => Ok(resp),
            Err(ureq::Error::Transport(e)) => Err(Error::Network {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn observed_headers(&self, resp: &ureq::Response) -> HashMap<String, String> {
        self.observe
            .iter()
            .filter_map(|name| {
                resp.header(name)
                    .map(|value| (name.clone(), value.to_string()))
            })
            .collect()
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, url: &str, max_size: u64) -> Result<HttpResponse> {
        log::debug!("GET {url}");
        let resp = self.call(url)?;
        let status = resp.status();
        let headers = self.observed_headers(&resp);
        let mut body = Vec::new();
        // one byte past the cap is enough for the caller to detect overflow
        resp.into_reader()
            .take(max_size + 1)
            .read_to_end(&mut body)?;
        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }

    fn download(&self, url: &str, sink: &mut dyn ChunkSink) -> Result<HttpResponse> {
        log::debug!("GET {url}");
        let resp = self.call(url)?;
        let status = resp.status();
        let headers = self.observed_headers(&resp);
        let mut reader = resp.into_reader();
        let mut buf = [0u8; DOWNLOAD_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            if sink.accept(&buf[..n]) != n {
                return Err(Error::DownloadAborted {
                    url: url.to_string(),
                });
            }
        }
        Ok(HttpResponse {
            status,
            body: Vec::new(),
            headers,
        })
    }
}

/// Factory producing the default HTTPS transport, one per request.
pub fn default_transport_factory() -> TransportFactory {
    Box::new(|headers, observe| -> Box<dyn HttpTransport> {
        Box::new(UreqTransport::new(headers, observe))
    })
}
