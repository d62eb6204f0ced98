//! Manifest snapshot persistence and diffing.
//!
//! The remote manifest is a key -> version-token mapping. Exactly two
//! snapshots exist on disk per manifest type: the baseline from the previous
//! run ("last") and the one just captured ("now"). A run diffs the two,
//! writes the diff artifacts, then commits "now" as the new baseline.

mod index_text;
mod snapshot;

pub use index_text::parse_index_text;
pub use snapshot::{ManifestType, Snapshot, SnapshotStore};
