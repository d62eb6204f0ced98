//! Escalating extraction over ordered filter levels.
//!
//! Levels run most-precise-first and short-circuit on the first usable
//! output, so a precise match is never shadowed by a generic full dump.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::classify::AssetCategory;

use super::extractor::{BundleExtractor, ExtractFilters};

/// One bundle to extract. Transient, never persisted across runs.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub bundle_key: String,
    pub bundle_path: PathBuf,
    pub category: AssetCategory,
}

/// Terminal outcome of an extraction job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// A usable output file was located; the scratch directory holds the
    /// winning level's full output.
    Success(PathBuf),
    /// Every filter level ran dry. Reported, non-fatal.
    Exhausted,
}

/// Ordered filter levels for one bundle, scoped to its exact key.
///
/// Image categories escalate from precise sprite/texture filters to a full
/// dump; voice tries the audio type first; prefabs go straight to a full
/// dump since their payload is not a single well-known asset type.
pub fn escalation_levels(bundle_key: &str, category: AssetCategory) -> Vec<ExtractFilters> {
    let containers = format!("^{}$", regex::escape(bundle_key));
    let scoped = |filters: ExtractFilters| filters.with_containers(containers.clone());

    match category {
        AssetCategory::Voice => vec![
            scoped(ExtractFilters::types(&["AudioClip"])),
            scoped(ExtractFilters::default()),
        ],
        AssetCategory::Prefab => vec![scoped(ExtractFilters::default())],
        _ => vec![
            scoped(ExtractFilters::types(&["Texture2D", "Sprite:Both"])),
            scoped(ExtractFilters::types(&[
                "Texture2D",
                "Sprite:Both",
                "SpriteAtlas",
            ])),
            scoped(ExtractFilters::default()),
        ],
    }
}

/// File extension expected from a successful extraction, if any single one.
pub fn expected_extension(category: AssetCategory) -> Option<&'static str> {
    match category {
        AssetCategory::Voice => Some("wav"),
        AssetCategory::Prefab => None,
        _ => Some("png"),
    }
}

/// Drives the extractor through the escalation ladder for one job at a time.
///
/// Owns the scratch directory exclusively while a job is in flight; each
/// level starts from a cleared scratch so a stale file from an earlier
/// bundle or level can never be mistaken for output.
pub struct Escalator<'a, E> {
    extractor: &'a E,
    scratch_dir: PathBuf,
}

impl<'a, E: BundleExtractor> Escalator<'a, E> {
    pub fn new(extractor: &'a E, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Run the ladder for `job`. `Ok(Exhausted)` when no level produced a
    /// usable file; `Err` only for environmental failures (scratch dir
    /// unusable, extractor binary cannot be spawned).
    pub async fn extract(&self, job: &ExtractionJob) -> Result<ExtractionOutcome> {
        let levels = escalation_levels(&job.bundle_key, job.category);
        let extension = expected_extension(job.category);

        for (index, filters) in levels.iter().enumerate() {
            let level = index + 1;
            clear_dir(&self.scratch_dir).with_context(|| {
                format!("Failed to reset scratch directory {:?}", self.scratch_dir)
            })?;

            let exit = self
                .extractor
                .run(&job.bundle_path, &self.scratch_dir, filters)
                .await
                .with_context(|| format!("Failed to invoke extractor for {}", job.bundle_key))?;

            debug!(
                "Extractor level {}/{} for {} exited with {:?}",
                level,
                levels.len(),
                job.bundle_key,
                exit.code
            );

            if let Some(found) = locate_output(&self.scratch_dir, extension) {
                debug!("Level {} located output: {:?}", level, found);
                return Ok(ExtractionOutcome::Success(found));
            }
        }

        warn!(
            "All {} filter levels exhausted for {}",
            levels.len(),
            job.bundle_key
        );
        Ok(ExtractionOutcome::Exhausted)
    }
}

/// Search `dir` recursively for an output file with the expected extension
/// (any file when `None`). On multiple candidates the shortest path wins:
/// the primary output, not a nested duplicate. Ties break lexicographically
/// for determinism.
pub fn locate_output(dir: &Path, extension: Option<&str>) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| match extension {
            Some(ext) => path
                .extension()
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false),
            None => true,
        })
        .collect();

    candidates.sort_by(|a, b| {
        let la = a.as_os_str().len();
        let lb = b.as_os_str().len();
        la.cmp(&lb).then_with(|| a.cmp(b))
    });
    candidates.into_iter().next()
}

/// Remove and recreate a directory.
pub fn clear_dir(dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use crate::extract::extractor::ExtractorExit;

    /// Scripted extractor: on the Nth invocation (1-based), writes the
    /// configured files relative to the output directory.
    struct ScriptedExtractor {
        outputs: Vec<Vec<&'static str>>,
        invocations: AtomicUsize,
    }

    impl ScriptedExtractor {
        fn new(outputs: Vec<Vec<&'static str>>) -> Self {
            Self {
                outputs,
                invocations: AtomicUsize::new(0),
            }
        }

        fn invocation_count(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BundleExtractor for ScriptedExtractor {
        async fn run(
            &self,
            _input: &Path,
            output_dir: &Path,
            _filters: &ExtractFilters,
        ) -> std::io::Result<ExtractorExit> {
            let call = self.invocations.fetch_add(1, Ordering::SeqCst);
            if let Some(files) = self.outputs.get(call) {
                for rel in files {
                    let path = output_dir.join(rel);
                    std::fs::create_dir_all(path.parent().unwrap())?;
                    std::fs::write(&path, b"data")?;
                }
            }
            Ok(ExtractorExit { code: Some(0) })
        }
    }

    fn job(key: &str, category: AssetCategory) -> ExtractionJob {
        ExtractionJob {
            bundle_key: key.to_string(),
            bundle_path: PathBuf::from("/in").join(key),
            category,
        }
    }

    #[test]
    fn test_levels_are_ordered_most_precise_first() {
        let levels = escalation_levels("Card_1_bust_card_20413550_1_png", AssetCategory::Bust);
        assert_eq!(levels.len(), 3);
        assert_eq!(
            levels[0].types.as_deref(),
            Some(&["Texture2D".to_string(), "Sprite:Both".to_string()][..])
        );
        assert_eq!(levels[1].types.as_ref().map(|t| t.len()), Some(3));
        assert!(levels[2].types.is_none());
        // Every level is scoped to the exact bundle key.
        for level in &levels {
            assert_eq!(
                level.containers.as_deref(),
                Some("^Card_1_bust_card_20413550_1_png$")
            );
        }
    }

    #[test]
    fn test_voice_and_prefab_ladders() {
        let voice = escalation_levels("Sound_Voice_Player_20413550_00_wav", AssetCategory::Voice);
        assert_eq!(voice.len(), 2);
        assert_eq!(voice[0].types.as_deref(), Some(&["AudioClip".to_string()][..]));

        let prefab = escalation_levels(
            "Character_Prefabs_Player_ply_20413550_prefab",
            AssetCategory::Prefab,
        );
        assert_eq!(prefab.len(), 1);
        assert!(prefab[0].types.is_none());
    }

    #[tokio::test]
    async fn test_escalates_through_all_levels_until_hit() {
        let dir = TempDir::new().unwrap();
        let extractor = ScriptedExtractor::new(vec![
            vec![],
            vec![],
            vec!["Texture2D/card.png"],
        ]);
        let escalator = Escalator::new(&extractor, dir.path().join("scratch"));

        let outcome = escalator
            .extract(&job("Card_1_bust_card_20413550_1_png", AssetCategory::Bust))
            .await
            .unwrap();

        assert_eq!(extractor.invocation_count(), 3);
        match outcome {
            ExtractionOutcome::Success(path) => {
                assert!(path.ends_with("Texture2D/card.png"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_circuits_on_first_level_hit() {
        let dir = TempDir::new().unwrap();
        let extractor = ScriptedExtractor::new(vec![vec!["card.png"]]);
        let escalator = Escalator::new(&extractor, dir.path().join("scratch"));

        let outcome = escalator
            .extract(&job("Card_1_bust_card_20413550_1_png", AssetCategory::Bust))
            .await
            .unwrap();

        assert_eq!(extractor.invocation_count(), 1);
        assert!(matches!(outcome, ExtractionOutcome::Success(_)));
    }

    #[tokio::test]
    async fn test_exhausted_when_no_level_produces_expected_type() {
        let dir = TempDir::new().unwrap();
        // Produces files, but never one of the expected type.
        let extractor =
            ScriptedExtractor::new(vec![vec!["a.txt"], vec!["b.txt"], vec!["c.txt"]]);
        let escalator = Escalator::new(&extractor, dir.path().join("scratch"));

        let outcome = escalator
            .extract(&job("Card_1_bust_card_20413550_1_png", AssetCategory::Bust))
            .await
            .unwrap();

        assert_eq!(extractor.invocation_count(), 3);
        assert_eq!(outcome, ExtractionOutcome::Exhausted);
    }

    #[tokio::test]
    async fn test_scratch_is_cleared_between_levels() {
        let dir = TempDir::new().unwrap();
        // Level 1 leaves a decoy of the wrong type; level 2 produces nothing.
        // If scratch were reused, the level-3 search would still only see the
        // decoy; instead each level starts clean and level 3's png wins.
        let extractor = ScriptedExtractor::new(vec![
            vec!["decoy.txt"],
            vec![],
            vec!["real.png"],
        ]);
        let escalator = Escalator::new(&extractor, dir.path().join("scratch"));

        let outcome = escalator
            .extract(&job("Card_1_bust_card_20413550_1_png", AssetCategory::Bust))
            .await
            .unwrap();

        match outcome {
            ExtractionOutcome::Success(path) => assert!(path.ends_with("real.png")),
            other => panic!("expected success, got {:?}", other),
        }
        assert!(!escalator.scratch_dir().join("decoy.txt").exists());
    }

    #[test]
    fn test_locate_output_prefers_shortest_path() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("nested/deeper/dup.png"), b"x").unwrap();
        std::fs::write(dir.path().join("main.png"), b"x").unwrap();

        let found = locate_output(dir.path(), Some("png")).unwrap();
        assert!(found.ends_with("main.png"));
    }

    #[test]
    fn test_locate_output_extension_filter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("audio.WAV"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        assert!(locate_output(dir.path(), Some("wav"))
            .unwrap()
            .ends_with("audio.WAV"));
        assert!(locate_output(dir.path(), Some("png")).is_none());
        // No filter accepts any file.
        assert!(locate_output(dir.path(), None).is_some());
    }
}
