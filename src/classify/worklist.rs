//! Work-list construction.
//!
//! Turns a set of requested entity IDs plus the current manifest snapshot into
//! the deduplicated, order-preserving list of bundle keys to process.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

use super::{AssetCategory, KeyClassifier};

/// Per-category enable flags and synthesis options for work-list building.
#[derive(Debug, Clone)]
pub struct WorkListOptions {
    pub include_icon: bool,
    pub include_bust: bool,
    pub include_full: bool,
    pub include_evol: bool,
    pub include_voice: bool,
    pub include_prefab: bool,
    /// Synthesize canonical card keys for enabled categories missing from the
    /// manifest, so every entity gets its full card set.
    pub force_required_categories: bool,
    pub voice_count: u32,
}

impl Default for WorkListOptions {
    fn default() -> Self {
        Self {
            include_icon: true,
            include_bust: true,
            include_full: true,
            include_evol: true,
            include_voice: true,
            include_prefab: true,
            force_required_categories: true,
            voice_count: 55,
        }
    }
}

impl WorkListOptions {
    /// Enabled card categories in canonical slot order.
    pub fn enabled_card_categories(&self) -> Vec<AssetCategory> {
        AssetCategory::card_categories()
            .into_iter()
            .filter(|c| match c {
                AssetCategory::Icon => self.include_icon,
                AssetCategory::Bust => self.include_bust,
                AssetCategory::Full => self.include_full,
                AssetCategory::Evol => self.include_evol,
                _ => false,
            })
            .collect()
    }
}

/// Build the work list for `entity_ids` against the available manifest keys.
///
/// Per entity: matching card keys restricted to enabled categories, sorted by
/// key; then (if configured) synthesized canonical keys for enabled categories
/// the manifest lookup missed; then voice and prefab keys. Exact duplicates
/// are suppressed, preserving first-seen order.
pub fn build_work_list<'a>(
    entity_ids: &[String],
    available_keys: impl IntoIterator<Item = &'a str>,
    options: &WorkListOptions,
) -> Vec<String> {
    let classifier = KeyClassifier::new(options.voice_count);
    let enabled_cards = options.enabled_card_categories();
    let available: Vec<&str> = available_keys.into_iter().collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();
    let mut push = |key: String, out: &mut Vec<String>| {
        if seen.insert(key.clone()) {
            out.push(key);
        }
    };

    for entity_id in entity_ids {
        let mut cards: Vec<String> = available
            .iter()
            .filter_map(|k| classifier.classify(k))
            .filter(|c| &c.entity_id == entity_id && enabled_cards.contains(&c.category))
            .map(|c| c.raw_key)
            .collect();
        cards.sort();

        let have: HashSet<AssetCategory> = cards
            .iter()
            .filter_map(|k| classifier.classify(k))
            .map(|c| c.category)
            .collect();

        for key in cards {
            push(key, &mut out);
        }

        if options.force_required_categories {
            for category in &enabled_cards {
                if !have.contains(category) {
                    if let Some(key) = KeyClassifier::canonical_card_key(entity_id, *category) {
                        push(key, &mut out);
                    }
                }
            }
        }

        if options.include_voice {
            for key in KeyClassifier::voice_keys(entity_id, options.voice_count) {
                push(key, &mut out);
            }
        }

        if options.include_prefab {
            push(KeyClassifier::prefab_key(entity_id), &mut out);
        }
    }

    out
}

/// Write the work list, one key per line.
pub fn write_work_list(path: &Path, keys: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create work list directory: {:?}", parent))?;
    }
    let mut content = keys.join("\n");
    content.push('\n');
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write work list: {:?}", path))
}

/// Read a work list, skipping blank lines and `#`/`//` comments.
pub fn read_work_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Work list not found: {:?}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('#') && !s.starts_with("//"))
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collects_manifest_keys_sorted() {
        let available = [
            "Card_2_full_card_20413550_2_png",
            "Card_0_icon_card_20413550_0_png",
            "Card_1_bust_card_99999999_1_png",
        ];
        let options = WorkListOptions {
            include_voice: false,
            include_prefab: false,
            force_required_categories: false,
            ..Default::default()
        };

        let list = build_work_list(&ids(&["20413550"]), available.iter().copied(), &options);
        assert_eq!(
            list,
            vec![
                "Card_0_icon_card_20413550_0_png",
                "Card_2_full_card_20413550_2_png",
            ]
        );
    }

    #[test]
    fn test_force_required_categories_synthesizes_missing_keys() {
        // Entity entirely absent from the manifest still yields exactly the
        // enabled categories' canonical keys, once each, in category order.
        let options = WorkListOptions {
            include_voice: false,
            include_prefab: false,
            ..Default::default()
        };

        let list = build_work_list(&ids(&["20413550"]), std::iter::empty(), &options);
        assert_eq!(
            list,
            vec![
                "Card_0_icon_card_20413550_0_png",
                "Card_1_bust_card_20413550_1_png",
                "Card_2_full_card_20413550_2_png",
                "Card_3_evol_card_20413550_3_png",
            ]
        );
    }

    #[test]
    fn test_force_does_not_duplicate_manifest_keys() {
        let available = ["Card_1_bust_card_20413550_1_png"];
        let options = WorkListOptions {
            include_icon: false,
            include_full: false,
            include_evol: false,
            include_voice: false,
            include_prefab: false,
            ..Default::default()
        };

        let list = build_work_list(&ids(&["20413550"]), available.iter().copied(), &options);
        assert_eq!(list, vec!["Card_1_bust_card_20413550_1_png"]);
    }

    #[test]
    fn test_disabled_categories_are_excluded() {
        let available = [
            "Card_0_icon_card_20413550_0_png",
            "Card_1_bust_card_20413550_1_png",
        ];
        let options = WorkListOptions {
            include_icon: false,
            include_voice: false,
            include_prefab: false,
            force_required_categories: false,
            ..Default::default()
        };

        let list = build_work_list(&ids(&["20413550"]), available.iter().copied(), &options);
        assert_eq!(list, vec!["Card_1_bust_card_20413550_1_png"]);
    }

    #[test]
    fn test_voice_and_prefab_appended_per_entity() {
        let options = WorkListOptions {
            include_icon: false,
            include_bust: false,
            include_full: false,
            include_evol: false,
            voice_count: 2,
            ..Default::default()
        };

        let list = build_work_list(&ids(&["20413550"]), std::iter::empty(), &options);
        assert_eq!(
            list,
            vec![
                "Sound_Voice_Player_20413550_00_wav",
                "Sound_Voice_Player_20413550_01_wav",
                "Character_Prefabs_Player_ply_20413550_prefab",
            ]
        );
    }

    #[test]
    fn test_work_list_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("card_txt").join("card.txt");
        let keys = ids(&[
            "Card_1_bust_card_20413550_1_png",
            "Sound_Voice_Player_20413550_00_wav",
        ]);

        write_work_list(&path, &keys).unwrap();
        assert_eq!(read_work_list(&path).unwrap(), keys);
    }

    #[test]
    fn test_read_work_list_skips_comments_and_blanks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("card.txt");
        std::fs::write(
            &path,
            "# comment\n\nCard_1_bust_card_20413550_1_png\n// another\n  \n",
        )
        .unwrap();

        assert_eq!(
            read_work_list(&path).unwrap(),
            vec!["Card_1_bust_card_20413550_1_png"]
        );
    }

    #[test]
    fn test_read_work_list_missing_file_is_an_error() {
        assert!(read_work_list(Path::new("/nonexistent/card.txt")).is_err());
    }
}
