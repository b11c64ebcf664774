//! Device-side core for applying signed updates from a local medium.
//!
//! An update bundle carries TUF metadata, a bare OSTree repository and a
//! set of compose apps addressed through a shared content-addressed blob
//! store. This crate picks the signed target the bundle satisfies, streams
//! and verifies every artifact through the same registry pipeline an
//! online client would use, registers the bundled images with the
//! container runtime and drives the two-phase install.

pub mod bundle;
pub mod client;
pub mod compose;
pub mod config;
pub mod distribution;
pub mod docker;
pub mod error;
pub mod http;
pub mod offline;
pub mod ostree;
pub mod target;
pub mod tuf;

mod digest;
mod uri;

pub use digest::{HashedDigest, DIGEST_PREFIX};
pub use error::{Error, Result};
pub use uri::Uri;
