use crate::error::Error;
use crate::http::ChunkSink;
use sha2::{Digest as _, Sha256};
use std::io::{Seek, Write};

/// Outcome of a streamed transfer, taken after the writer is closed.
pub struct DownloadOutcome {
    /// Bytes actually written to the sink.
    pub written: u64,
    /// Bytes offered by the transport, including any rejected chunk.
    pub received: u64,
    /// Lowercase hex SHA-256 of every byte the context accepted.
    pub digest_hex: String,
    /// The failure that made the context abort the transfer, if any.
    pub failure: Option<Error>,
}

/// Write-side of a blob transfer: writes to the output, hashes what it sees
/// and refuses to grow past the expected size, all in one pass.
///
/// Plugged into a transport as a [ChunkSink]; a refused chunk (return value
/// other than the chunk length) makes the transport abort the transfer.
pub struct DownloadContext<W: Write + Seek> {
    out: W,
    hasher: Sha256,
    artifact: String,
    expected_size: u64,
    written: u64,
    received: u64,
    failure: Option<Error>,
}

impl<W: Write + Seek> DownloadContext<W> {
    pub fn new(out: W, expected_size: u64, artifact: impl Into<String>) -> Self {
        Self {
            out,
            hasher: Sha256::new(),
            artifact: artifact.into(),
            expected_size,
            written: 0,
            received: 0,
            failure: None,
        }
    }

    /// Rewind the output and start over. Invoked exactly when the transfer
    /// is retried after authentication.
    pub fn reset(&mut self) -> std::io::Result<()> {
        self.out.rewind()?;
        self.hasher = Sha256::new();
        self.written = 0;
        self.received = 0;
        self.failure = None;
        Ok(())
    }

    /// Close the output and hand the counters to the caller for the
    /// post-transfer checks.
    pub fn finish(self) -> DownloadOutcome {
        DownloadOutcome {
            written: self.written,
            received: self.received,
            digest_hex: base16ct::lower::encode_string(&self.hasher.finalize()),
            failure: self.failure,
        }
    }
}

impl<W: Write + Seek> ChunkSink for DownloadContext<W> {
    fn accept(&mut self, chunk: &[u8]) -> usize {
        let size = chunk.len();
        self.received = self.written + size as u64;
        if self.received > self.expected_size {
            log::error!(
                "received data size exceeds the expected size: {} > {}",
                self.received,
                self.expected_size
            );
            self.failure = Some(Error::SizeMismatch {
                artifact: self.artifact.clone(),
                got: self.received,
                want: self.expected_size,
            });
            return size + 1;
        }

        let accepted = match self.out.write(chunk) {
            Ok(n) => n,
            Err(e) => {
                log::error!("output sink is at a bad state: {e}");
                self.failure = Some(Error::Io(e));
                return size + 1;
            }
        };
        // hash the input bytes, not the accepted delta: every byte observed
        // must enter the digest even on a partial write
        self.hasher.update(chunk);
        self.written += accepted as u64;
        accepted
    }
}
