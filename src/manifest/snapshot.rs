//! Snapshot types and the on-disk snapshot store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use tracing::warn;

/// The manifest types the remote host publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ManifestType {
    Card,
    Area,
    Item,
    Event,
}

impl ManifestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestType::Card => "Card",
            ManifestType::Area => "Area",
            ManifestType::Item => "Item",
            ManifestType::Event => "Event",
        }
    }

    /// Name of the remote bundle carrying this manifest's index text.
    pub fn index_bundle_name(&self) -> String {
        format!("_Version_a_{}_txt.unity3d", self.as_str())
    }

    /// Name of the index text file inside the extracted bundle.
    pub fn index_text_name(&self) -> String {
        format!("{}.dat", self.as_str())
    }
}

impl std::fmt::Display for ManifestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full capture of one manifest type's key -> version-token mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub manifest_type: ManifestType,
    pub entries: BTreeMap<String, String>,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(manifest_type: ManifestType, entries: BTreeMap<String, String>) -> Self {
        Self {
            manifest_type,
            entries,
            captured_at: Utc::now(),
        }
    }

    pub fn empty(manifest_type: ManifestType) -> Self {
        Self::new(manifest_type, BTreeMap::new())
    }
}

/// Persists snapshots and diff artifacts under a single store directory.
///
/// The store exclusively owns the `last`/`now` files between runs; no
/// historical versions are retained beyond the single "last" baseline.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    store_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
        }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn last_path(&self, manifest_type: ManifestType) -> PathBuf {
        self.store_dir.join(format!("last_{manifest_type}.json"))
    }

    fn now_path(&self, manifest_type: ManifestType) -> PathBuf {
        self.store_dir.join(format!("now_{manifest_type}.json"))
    }

    fn diff_path(&self, manifest_type: ManifestType) -> PathBuf {
        self.store_dir.join(format!("new_{manifest_type}.txt"))
    }

    fn entity_ids_path(&self, manifest_type: ManifestType) -> PathBuf {
        self.store_dir
            .join(format!("new_{manifest_type}_character_ids.txt"))
    }

    /// Load the baseline snapshot from the previous run.
    ///
    /// An absent or unreadable file yields an empty snapshot, never an error:
    /// a first run simply treats every key as changed.
    pub fn load_last(&self, manifest_type: ManifestType) -> Snapshot {
        match read_mapping(&self.last_path(manifest_type)) {
            Ok(Some(entries)) => Snapshot::new(manifest_type, entries),
            Ok(None) => Snapshot::empty(manifest_type),
            Err(e) => {
                warn!(
                    "Ignoring unreadable baseline snapshot for {}: {}",
                    manifest_type, e
                );
                Snapshot::empty(manifest_type)
            }
        }
    }

    /// Load the current snapshot committed by the most recent refresh.
    ///
    /// Unlike `load_last` this is an error when absent: downstream stages
    /// cannot work without a current mapping.
    pub fn load_now(&self, manifest_type: ManifestType) -> Result<Snapshot> {
        let path = self.now_path(manifest_type);
        let entries = read_mapping(&path)
            .with_context(|| format!("Failed to read snapshot: {:?}", path))?
            .with_context(|| format!("Snapshot not found (run a refresh first): {:?}", path))?;
        Ok(Snapshot::new(manifest_type, entries))
    }

    /// Keys present in `now` that are absent from `last` or carry a different
    /// version token. Sorted ascending, no duplicates.
    pub fn diff(now: &Snapshot, last: &Snapshot) -> Vec<String> {
        now.entries
            .iter()
            .filter(|(key, token)| last.entries.get(*key) != Some(token))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Persist `now` under its own name and overwrite the baseline with it.
    ///
    /// Both writes go through a temp-file rename so a crash cannot leave a
    /// torn mapping; the baseline is only ever replaced wholesale.
    pub fn commit(&self, now: &Snapshot) -> Result<()> {
        std::fs::create_dir_all(&self.store_dir)
            .with_context(|| format!("Failed to create store directory: {:?}", self.store_dir))?;

        let json = serde_json::to_string_pretty(&now.entries)
            .context("Failed to serialize snapshot")?;
        write_atomic(&self.now_path(now.manifest_type), json.as_bytes())?;
        write_atomic(&self.last_path(now.manifest_type), json.as_bytes())?;
        Ok(())
    }

    /// Write the diff artifacts: the sorted changed-key list and the derived
    /// entity-ID list, one item per line.
    pub fn write_diff_artifacts(
        &self,
        manifest_type: ManifestType,
        changed_keys: &[String],
        entity_ids: &[String],
    ) -> Result<()> {
        std::fs::create_dir_all(&self.store_dir)
            .with_context(|| format!("Failed to create store directory: {:?}", self.store_dir))?;
        write_atomic(&self.diff_path(manifest_type), lines(changed_keys).as_bytes())?;
        write_atomic(
            &self.entity_ids_path(manifest_type),
            lines(entity_ids).as_bytes(),
        )?;
        Ok(())
    }
}

fn lines(items: &[String]) -> String {
    if items.is_empty() {
        String::new()
    } else {
        let mut s = items.join("\n");
        s.push('\n');
        s
    }
}

fn read_mapping(path: &Path) -> Result<Option<BTreeMap<String, String>>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    let entries = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse snapshot JSON: {:?}", path))?;
    Ok(Some(entries))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).with_context(|| format!("Failed to write {:?}", tmp))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {:?} into place", tmp))?;
    Ok(())
}
