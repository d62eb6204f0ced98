//! Content-aware image geometry normalization.
//!
//! The extractor emits a few known-broken aspect ratios (textures stored
//! square that the game stretches at render time). A fixed rule table maps
//! `(unit name, current size)` to the corrected size; everything else passes
//! through untouched.

use std::path::Path;

use image::imageops::FilterType;
use image::GenericImageView;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Tally of one geometry normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryReport {
    pub scanned: usize,
    pub resized: usize,
}

impl GeometryReport {
    pub fn merge(&mut self, other: GeometryReport) {
        self.scanned += other.scanned;
        self.resized += other.resized;
    }
}

/// Target size for an image, given its unit name and current dimensions.
///
/// Pure function of `(unit_stem, width, height)`: `None` means the image is
/// left untouched.
pub fn plan_resize(unit_stem: &str, width: u32, height: u32) -> Option<(u32, u32)> {
    if unit_stem.starts_with("Card")
        && !unit_stem.contains("std")
        && !unit_stem.ends_with("w_png")
        && (width, height) == (1024, 1024)
    {
        return Some((1024, 1331));
    }

    if unit_stem.starts_with("Location") {
        if (width, height) == (512, 512) {
            return Some((768, 512));
        }
        if (width, height) == (1024, 1024) {
            return Some((1536, 1024));
        }
    }

    if unit_stem.contains("loginBonus_bg") && (width, height) == (1024, 1024) {
        return Some((1024, 1536));
    }

    None
}

/// Apply the resize rules to every PNG under a unit directory.
///
/// Unreadable images are skipped, never fatal. Resizing stretches to the
/// target size with Lanczos3 resampling and rewrites the file in place.
pub fn normalize_unit_images(unit_dir: &Path, unit_stem: &str) -> GeometryReport {
    let mut report = GeometryReport::default();

    let pngs = WalkDir::new(unit_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|e| e.eq_ignore_ascii_case("png"))
                .unwrap_or(false)
        });

    for path in pngs {
        report.scanned += 1;

        let img = match image::open(&path) {
            Ok(img) => img,
            Err(e) => {
                warn!("Skipping unreadable image {:?}: {}", path, e);
                continue;
            }
        };

        let (width, height) = img.dimensions();
        let Some((target_w, target_h)) = plan_resize(unit_stem, width, height) else {
            continue;
        };

        let resized = image::imageops::resize(&img.to_rgba8(), target_w, target_h, FilterType::Lanczos3);
        match resized.save(&path) {
            Ok(()) => {
                debug!(
                    "Resized {:?}: {}x{} -> {}x{}",
                    path, width, height, target_w, target_h
                );
                report.resized += 1;
            }
            Err(e) => warn!("Failed to save resized image {:?}: {}", path, e),
        }
    }

    report
}
