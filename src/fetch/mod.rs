//! Bundle fetching with bounded retries and content-sanity validation.
//!
//! The remote host is an unreliable byte source: a success status does not
//! mean the payload is a real bundle. Every downloaded payload is checked
//! against the recognized container magic signatures before it counts.

mod host;
mod retrier;

pub use host::{BundleHost, FetchedBody, HttpBundleHost, TransportError};
pub use retrier::{FetchError, FetchRetrier, WriteOutcome};

/// Leading-byte signatures of recognized binary containers.
pub const BUNDLE_MAGIC: &[&[u8]] = &[b"UnityFS", b"UnityWeb", b"UnityRaw"];

/// True if the payload's leading bytes match a recognized container signature.
pub fn is_bundle_payload(payload: &[u8]) -> bool {
    BUNDLE_MAGIC.iter().any(|magic| payload.starts_with(magic))
}
