//! Manifest key classification.
//!
//! Manifest keys are opaque strings with fixed structural patterns per asset
//! category. Classification is a pure function: the same key always yields the
//! same result, and a key matching no known pattern yields no classification
//! at all (it is excluded from entity-scoped work, never an error).

mod worklist;

pub use worklist::{build_work_list, read_work_list, write_work_list, WorkListOptions};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CARD_RE: Regex =
        Regex::new(r"(?i)^Card_([0-3])_(icon|bust|full|evol)_card_(\d{8})_([0-3])_png$")
            .expect("invalid card key pattern");
    static ref VOICE_RE: Regex = Regex::new(r"(?i)^Sound_Voice_Player_(\d{8})_(\d{2})_wav$")
        .expect("invalid voice key pattern");
    static ref PREFAB_RE: Regex = Regex::new(r"(?i)^Character_Prefabs_Player_ply_(\d{8})_prefab$")
        .expect("invalid prefab key pattern");
    static ref CARD_ENTITY_RE: Regex =
        Regex::new(r"(?i)card_(\d+)_\d+_png$").expect("invalid card entity pattern");
}

/// Asset category a manifest key belongs to.
///
/// Card slots 0-3 map to the four card categories; voice and prefab keys have
/// their own scaffolds. `Other` is reserved for callers that need a bucket for
/// recognized-but-unscoped assets; `classify` itself never produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetCategory {
    Icon,
    Bust,
    Full,
    Evol,
    Voice,
    Prefab,
    Other,
}

impl AssetCategory {
    /// Map a card slot index (0-3) to its category.
    pub fn from_card_slot(slot: u8) -> Option<Self> {
        match slot {
            0 => Some(AssetCategory::Icon),
            1 => Some(AssetCategory::Bust),
            2 => Some(AssetCategory::Full),
            3 => Some(AssetCategory::Evol),
            _ => None,
        }
    }

    /// The card slot index of this category, if it is a card category.
    pub fn card_slot(&self) -> Option<u8> {
        match self {
            AssetCategory::Icon => Some(0),
            AssetCategory::Bust => Some(1),
            AssetCategory::Full => Some(2),
            AssetCategory::Evol => Some(3),
            _ => None,
        }
    }

    /// The category name as it appears inside card keys.
    pub fn card_name(&self) -> Option<&'static str> {
        match self {
            AssetCategory::Icon => Some("icon"),
            AssetCategory::Bust => Some("bust"),
            AssetCategory::Full => Some("full"),
            AssetCategory::Evol => Some("evol"),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Icon => "icon",
            AssetCategory::Bust => "bust",
            AssetCategory::Full => "full",
            AssetCategory::Evol => "evol",
            AssetCategory::Voice => "voice",
            AssetCategory::Prefab => "prefab",
            AssetCategory::Other => "other",
        }
    }

    /// Card categories in canonical slot order.
    pub fn card_categories() -> [AssetCategory; 4] {
        [
            AssetCategory::Icon,
            AssetCategory::Bust,
            AssetCategory::Full,
            AssetCategory::Evol,
        ]
    }
}

/// A manifest key resolved to its owning entity and category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedKey {
    pub entity_id: String,
    pub category: AssetCategory,
    pub raw_key: String,
}

/// Pattern layer turning manifest keys into `(entity, category)` pairs.
#[derive(Debug, Clone)]
pub struct KeyClassifier {
    voice_count: u32,
}

impl KeyClassifier {
    /// `voice_count` bounds the two-digit index accepted on voice keys.
    pub fn new(voice_count: u32) -> Self {
        Self { voice_count }
    }

    /// Classify a manifest key, or return `None` for unrecognized keys.
    pub fn classify(&self, key: &str) -> Option<ClassifiedKey> {
        if let Some(caps) = CARD_RE.captures(key) {
            let slot: u8 = caps[1].parse().ok()?;
            let category = AssetCategory::from_card_slot(slot)?;
            return Some(ClassifiedKey {
                entity_id: caps[3].to_string(),
                category,
                raw_key: key.to_string(),
            });
        }

        if let Some(caps) = VOICE_RE.captures(key) {
            let index: u32 = caps[2].parse().ok()?;
            if index >= self.voice_count {
                return None;
            }
            return Some(ClassifiedKey {
                entity_id: caps[1].to_string(),
                category: AssetCategory::Voice,
                raw_key: key.to_string(),
            });
        }

        if let Some(caps) = PREFAB_RE.captures(key) {
            return Some(ClassifiedKey {
                entity_id: caps[1].to_string(),
                category: AssetCategory::Prefab,
                raw_key: key.to_string(),
            });
        }

        None
    }

    /// Build the canonical card key for an entity and card category.
    ///
    /// Returns `None` for non-card categories.
    pub fn canonical_card_key(entity_id: &str, category: AssetCategory) -> Option<String> {
        let slot = category.card_slot()?;
        let name = category.card_name()?;
        Some(format!("Card_{slot}_{name}_card_{entity_id}_{slot}_png"))
    }

    /// Canonical voice keys for an entity, indices `00..count`.
    pub fn voice_keys(entity_id: &str, count: u32) -> Vec<String> {
        (0..count)
            .map(|i| format!("Sound_Voice_Player_{entity_id}_{i:02}_wav"))
            .collect()
    }

    /// Canonical prefab key for an entity.
    pub fn prefab_key(entity_id: &str) -> String {
        format!("Character_Prefabs_Player_ply_{entity_id}_prefab")
    }

    /// Derive the sorted, deduplicated set of entity IDs referenced by card
    /// keys in `keys`. Non-card keys contribute nothing.
    pub fn entity_ids_from_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut ids: Vec<String> = keys
            .into_iter()
            .filter_map(|k| CARD_ENTITY_RE.captures(k))
            .map(|caps| caps[1].to_string())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
