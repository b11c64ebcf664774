use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// A canonical SHA-256 content digest.
///
/// Rendered as `sha256:<hex>` where `<hex>` is exactly 64 lowercase hex
/// characters. Input is normalized to lowercase at construction; anything
/// that does not match the canonical form is rejected there, so a value of
/// this type is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashedDigest {
    hex: String,
}

/// The only digest algorithm accepted on update media.
pub const DIGEST_PREFIX: &str = "sha256:";

lazy_static::lazy_static! {
    static ref HEX_RE: Regex = Regex::new(r"^[0-9a-f]+$").unwrap();
}

impl HashedDigest {
    pub fn parse(input: &str) -> Result<Self> {
        let canonical = input.to_lowercase();
        let hex = canonical
            .strip_prefix(DIGEST_PREFIX)
            .ok_or_else(|| Error::UnsupportedHash(input.to_string()))?;
        if hex.len() != 64 {
            return Err(Error::BadHashLength(input.to_string()));
        }
        if !HEX_RE.is_match(hex) {
            return Err(Error::BadHash(input.to_string()));
        }
        Ok(Self {
            hex: hex.to_string(),
        })
    }

    /// Digest of an in-memory buffer.
    pub fn of_buf(buf: &[u8]) -> Self {
        let hash = Sha256::digest(buf);
        Self {
            hex: base16ct::lower::encode_string(&hash),
        }
    }

    /// The 64-char lowercase hex part.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// First seven hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.hex[..7]
    }
}

impl fmt::Display for HashedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", DIGEST_PREFIX, self.hex)
    }
}

impl Serialize for HashedDigest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HashedDigest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<HashedDigest, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HashedDigest::parse(&s).map_err(serde::de::Error::custom)
    }
}
