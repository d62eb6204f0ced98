//! Reorganizes extractor output units into the per-entity library tree.
//!
//! A *unit* is the top-level directory the extraction stage produces per
//! bundle, named `{bundle_key}.unity3d_export`. Organization derives the
//! owning entity from the unit name, relocates every file into the entity's
//! subtree with collision-safe naming, and removes the emptied sources.

mod geometry;

pub use geometry::{normalize_unit_images, plan_resize, GeometryReport};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Suffix marking a top-level directory as an extractor output unit.
pub const UNIT_SUFFIX: &str = ".unity3d_export";

lazy_static! {
    // A numeric run of 6+ digits framed by separators is the entity ID.
    static ref ENTITY_ID_RE: Regex = Regex::new(r"_(\d{6,})_").expect("invalid entity id pattern");
}

/// Per-run tally of the organization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrganizationReport {
    /// Units relocated into the entity tree.
    pub organized: usize,
    /// Units whose entity ID could not be derived; left in place.
    pub skipped: usize,
}

/// Derive the owning entity ID from a unit name, if any.
pub fn extract_entity_id(name: &str) -> Option<String> {
    ENTITY_ID_RE
        .captures(name)
        .map(|caps| caps[1].to_string())
}

/// Replace reserved filename characters with `_`, trim dots and whitespace.
pub fn sanitize_unit_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if (c as u32) < 0x20 => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Moves extractor output units into the canonical per-entity tree.
pub struct OutputOrganizer {
    export_root: PathBuf,
}

impl OutputOrganizer {
    pub fn new(export_root: impl Into<PathBuf>) -> Self {
        Self {
            export_root: export_root.into(),
        }
    }

    /// Organize every unit directory under the export root.
    pub fn organize(&self) -> Result<OrganizationReport> {
        let mut report = OrganizationReport::default();

        for unit_dir in self.unit_dirs()? {
            let name = unit_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = name.trim_end_matches(UNIT_SUFFIX);

            let Some(entity_id) = extract_entity_id(stem) else {
                warn!("No entity ID in unit name, leaving in place: {}", name);
                report.skipped += 1;
                continue;
            };

            let dest = self
                .export_root
                .join(destination_for(stem, &entity_id));
            move_unit_files(&unit_dir, &dest)
                .with_context(|| format!("Failed to organize unit {}", name))?;

            // The unit directory itself should be empty now.
            if let Err(e) = std::fs::remove_dir(&unit_dir) {
                debug!("Could not remove unit directory {:?}: {}", unit_dir, e);
            }
            report.organized += 1;
        }

        Ok(report)
    }

    fn unit_dirs(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.export_root)
            .with_context(|| format!("Failed to read export root: {:?}", self.export_root))?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && p.file_name()
                        .map(|n| n.to_string_lossy().ends_with(UNIT_SUFFIX))
                        .unwrap_or(false)
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }
}

/// Destination subtree for a unit, relative to the export root.
/// Rules are checked in order; first match wins.
fn destination_for(stem: &str, entity_id: &str) -> PathBuf {
    if stem.starts_with("Sound_Voice_Player_") && stem.ends_with("_wav") {
        return Path::new(entity_id).join(format!("Sound_Voice_Player_{entity_id}_wav"));
    }
    if stem.starts_with("Character_Prefabs_Player_ply_") && stem.ends_with("_prefab") {
        return Path::new(entity_id).join(format!("Character_Prefabs_Player_ply_{entity_id}_prefab"));
    }
    if stem.starts_with("Card_") && stem.ends_with("_png") {
        return PathBuf::from(entity_id);
    }
    Path::new(entity_id)
        .join("_misc")
        .join(sanitize_unit_name(stem))
}

/// Move every file under `src` into `dst`, preserving relative paths except
/// container-hash (`CAB-*`) components, which carry no semantic meaning and
/// are stripped. Collisions get a `__dupN` suffix rather than overwriting.
/// Emptied source directories are removed bottom-up, best-effort.
fn move_unit_files(src: &Path, dst: &Path) -> Result<()> {
    let files: Vec<PathBuf> = WalkDir::new(src)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    for file in files {
        let rel = file.strip_prefix(src).expect("walked path under src");
        let Some(file_name) = rel.file_name() else {
            continue;
        };
        let mut target = dst.to_path_buf();
        for component in rel.iter().take(rel.iter().count().saturating_sub(1)) {
            if !component.to_string_lossy().starts_with("CAB-") {
                target.push(component);
            }
        }
        target.push(file_name);

        let target = unique_target(&target);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        std::fs::rename(&file, &target)
            .with_context(|| format!("Failed to move {:?} -> {:?}", file, target))?;
    }

    remove_empty_dirs(src);
    Ok(())
}

/// First non-existing variant of `path`: the path itself, then `__dup1`,
/// `__dup2`, ... appended before the extension.
fn unique_target(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    for i in 1..10_000 {
        let candidate = path.with_file_name(format!("{stem}__dup{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    path.with_file_name(format!("{stem}__dupX{ext}"))
}

/// Remove empty directories under `root`, deepest first. Failures (still
/// non-empty, already gone) are swallowed.
fn remove_empty_dirs(root: &Path) {
    let mut dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        let _ = std::fs::remove_dir(dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_extract_entity_id() {
        assert_eq!(
            extract_entity_id("Sound_Voice_Player_12345678_wav"),
            Some("12345678".to_string())
        );
        assert_eq!(
            extract_entity_id("Card_1_bust_card_20413550_1_png"),
            Some("20413550".to_string())
        );
        // Needs 6+ digits framed by separators.
        assert_eq!(extract_entity_id("Card_12345_png"), None);
        assert_eq!(extract_entity_id("no_digits_here"), None);
    }

    #[test]
    fn test_sanitize_unit_name() {
        assert_eq!(sanitize_unit_name("plain_name"), "plain_name");
        assert_eq!(sanitize_unit_name("a:b/c\\d"), "a_b_c_d");
        assert_eq!(sanitize_unit_name(" ..dots.. "), "dots");
        assert_eq!(sanitize_unit_name(""), "unnamed");
    }

    #[test]
    fn test_destination_rules() {
        assert_eq!(
            destination_for("Sound_Voice_Player_12345678_wav", "12345678"),
            Path::new("12345678").join("Sound_Voice_Player_12345678_wav")
        );
        assert_eq!(
            destination_for("Character_Prefabs_Player_ply_12345678_prefab", "12345678"),
            Path::new("12345678").join("Character_Prefabs_Player_ply_12345678_prefab")
        );
        assert_eq!(
            destination_for("Card_1_bust_card_12345678_1_png", "12345678"),
            PathBuf::from("12345678")
        );
        assert_eq!(
            destination_for("Location_12345678_png", "12345678"),
            Path::new("12345678").join("_misc").join("Location_12345678_png")
        );
    }

    #[test]
    fn test_voice_unit_flattens_container_hash_dirs() {
        let dir = TempDir::new().unwrap();
        let unit = dir
            .path()
            .join(format!("Sound_Voice_Player_12345678_wav{UNIT_SUFFIX}"));
        write(&unit.join("CAB-0a1b2c3d/voice_00.wav"), b"a");
        write(&unit.join("CAB-0a1b2c3d/voice_01.wav"), b"b");

        let report = OutputOrganizer::new(dir.path()).organize().unwrap();
        assert_eq!(report.organized, 1);
        assert_eq!(report.skipped, 0);

        let dest = dir.path().join("12345678/Sound_Voice_Player_12345678_wav");
        assert!(dest.join("voice_00.wav").exists());
        assert!(dest.join("voice_01.wav").exists());
        // Hash directories are gone from the destination paths and the
        // source unit is fully removed.
        assert!(!dest.join("CAB-0a1b2c3d").exists());
        assert!(!unit.exists());
    }

    #[test]
    fn test_card_unit_flattens_under_entity_root() {
        let dir = TempDir::new().unwrap();
        let unit = dir
            .path()
            .join(format!("Card_1_bust_card_12345678_1_png{UNIT_SUFFIX}"));
        write(&unit.join("Texture2D/card.png"), b"png");

        OutputOrganizer::new(dir.path()).organize().unwrap();

        assert!(dir.path().join("12345678/Texture2D/card.png").exists());
        assert!(!unit.exists());
    }

    #[test]
    fn test_unrecognized_unit_goes_to_misc() {
        let dir = TempDir::new().unwrap();
        let unit = dir.path().join(format!("Location_12345678_png{UNIT_SUFFIX}"));
        write(&unit.join("bg.png"), b"png");

        OutputOrganizer::new(dir.path()).organize().unwrap();

        assert!(dir
            .path()
            .join("12345678/_misc/Location_12345678_png/bg.png")
            .exists());
    }

    #[test]
    fn test_unit_without_entity_id_is_skipped() {
        let dir = TempDir::new().unwrap();
        let unit = dir.path().join(format!("SharedAtlas{UNIT_SUFFIX}"));
        write(&unit.join("atlas.png"), b"png");

        let report = OutputOrganizer::new(dir.path()).organize().unwrap();
        assert_eq!(report.organized, 0);
        assert_eq!(report.skipped, 1);
        // Left exactly where it was.
        assert!(unit.join("atlas.png").exists());
    }

    #[test]
    fn test_collisions_get_dup_suffix() {
        let dir = TempDir::new().unwrap();
        // Two card units for the same entity, both flattening a same-named
        // file into the entity root.
        let unit_a = dir
            .path()
            .join(format!("Card_1_bust_card_12345678_1_png{UNIT_SUFFIX}"));
        let unit_b = dir
            .path()
            .join(format!("Card_2_full_card_12345678_2_png{UNIT_SUFFIX}"));
        write(&unit_a.join("card.png"), b"first");
        write(&unit_b.join("card.png"), b"second");

        OutputOrganizer::new(dir.path()).organize().unwrap();

        let root = dir.path().join("12345678");
        assert_eq!(std::fs::read(root.join("card.png")).unwrap(), b"first");
        assert_eq!(
            std::fs::read(root.join("card__dup1.png")).unwrap(),
            b"second"
        );
    }

    #[test]
    fn test_entity_dirs_are_not_rescanned_as_units() {
        let dir = TempDir::new().unwrap();
        let unit = dir
            .path()
            .join(format!("Card_1_bust_card_12345678_1_png{UNIT_SUFFIX}"));
        write(&unit.join("card.png"), b"png");

        let organizer = OutputOrganizer::new(dir.path());
        organizer.organize().unwrap();
        // A second pass over the already-organized tree is a no-op.
        let report = organizer.organize().unwrap();
        assert_eq!(report, OrganizationReport::default());
        assert!(dir.path().join("12345678/card.png").exists());
    }
}
