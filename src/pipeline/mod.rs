//! Stage orchestration: refresh, worklist, harvest.
//!
//! One manifest type, one bundle, one extraction at a time. Individual item
//! failures are tallied and logged, never fatal to the batch; only
//! configuration-level failures (missing extractor binary, missing work
//! list) abort a run before any work starts.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::StreamExt;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::classify::{
    build_work_list, read_work_list, write_work_list, AssetCategory, KeyClassifier,
};
use crate::config::AppConfig;
use crate::extract::{
    clear_dir, BundleExtractor, CliExtractor, Escalator, ExtractFilters, ExtractionJob,
    ExtractionOutcome,
};
use crate::fetch::{BundleHost, FetchRetrier, HttpBundleHost, WriteOutcome};
use crate::manifest::{parse_index_text, Snapshot, SnapshotStore};
use crate::organize::{
    normalize_unit_images, sanitize_unit_name, GeometryReport, OrganizationReport,
    OutputOrganizer, UNIT_SUFFIX,
};

/// Result of a manifest refresh.
#[derive(Debug, Clone)]
pub struct RefreshSummary {
    pub total_keys: usize,
    pub changed_keys: Vec<String>,
    /// Entity IDs derived from the changed keys.
    pub entity_ids: Vec<String>,
}

/// Per-item tallies of a harvest run.
#[derive(Debug, Clone, Copy, Default)]
pub struct HarvestSummary {
    pub requested: usize,
    pub downloaded: usize,
    pub download_skipped: usize,
    pub download_failed: usize,
    pub extracted: usize,
    pub exhausted: usize,
    pub geometry: GeometryReport,
    pub organization: OrganizationReport,
}

/// The asset pipeline over a transport host and an extractor.
///
/// Both collaborators are capability traits so every stage can run against
/// scripted implementations in tests.
pub struct Pipeline<H, E> {
    config: AppConfig,
    retrier: FetchRetrier<H>,
    extractor: E,
}

/// Build the production pipeline: reqwest transport + extractor CLI.
pub fn production_pipeline(config: AppConfig) -> Pipeline<HttpBundleHost, CliExtractor> {
    let host = HttpBundleHost::new(config.fetch.timeout_sec);
    let extractor = CliExtractor::new(
        config.extractor.cli_path.clone(),
        &config.extractor.game,
        &config.extractor.export_type,
        &config.extractor.extra_args,
    );
    Pipeline::new(config, host, extractor)
}

impl<H: BundleHost, E: BundleExtractor> Pipeline<H, E> {
    pub fn new(config: AppConfig, host: H, extractor: E) -> Self {
        let retrier = FetchRetrier::new(host, config.fetch.retries, config.fetch.skip_existing);
        Self {
            config,
            retrier,
            extractor,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Capture the remote manifest, diff it against the baseline, write the
    /// diff artifacts, and commit the new baseline.
    pub async fn refresh(&self) -> Result<RefreshSummary> {
        self.config.validate_extractor()?;

        let manifest_type = self.config.manifest_type;
        let bundle_name = manifest_type.index_bundle_name();
        let url = format!(
            "{}{}?t={}",
            self.config.fetch.base_url,
            bundle_name,
            Utc::now().timestamp_millis()
        );
        let bundle_path = self.config.download_dir().join(&bundle_name);

        info!("Fetching {} manifest index: {}", manifest_type, bundle_name);
        self.retrier
            .fetch_validated(&url, &bundle_path)
            .await
            .with_context(|| format!("Failed to download manifest index {bundle_name}"))?;

        let index_text = self.extract_index_text(&bundle_path).await?;
        let now = Snapshot::new(manifest_type, parse_index_text(&index_text));

        let store = SnapshotStore::new(self.config.store_dir());
        let last = store.load_last(manifest_type);
        let changed = SnapshotStore::diff(&now, &last);
        let entity_ids = KeyClassifier::entity_ids_from_keys(changed.iter().map(String::as_str));

        store.write_diff_artifacts(manifest_type, &changed, &entity_ids)?;
        store.commit(&now)?;

        info!(
            "Manifest {} refreshed: {} keys total, {} changed, {} entities",
            manifest_type,
            now.entries.len(),
            changed.len(),
            entity_ids.len()
        );

        Ok(RefreshSummary {
            total_keys: now.entries.len(),
            changed_keys: changed,
            entity_ids,
        })
    }

    /// Build and persist the work list for the requested entities against
    /// the current snapshot.
    pub fn build_worklist(&self, entity_ids: &[String]) -> Result<Vec<String>> {
        let store = SnapshotStore::new(self.config.store_dir());
        let now = store.load_now(self.config.manifest_type)?;

        let keys = build_work_list(
            entity_ids,
            now.entries.keys().map(String::as_str),
            &self.config.worklist,
        );

        let path = self.config.work_list_path();
        write_work_list(&path, &keys)?;
        info!(
            "Work list written: {} keys for {} entities -> {:?}",
            keys.len(),
            entity_ids.len(),
            path
        );
        Ok(keys)
    }

    /// Process the persisted work list: fetch, extract, normalize, organize.
    pub async fn harvest(&self) -> Result<HarvestSummary> {
        self.config.validate_extractor()?;

        let keys = read_work_list(&self.config.work_list_path())?;
        let mut summary = HarvestSummary {
            requested: keys.len(),
            ..Default::default()
        };
        if keys.is_empty() {
            warn!("Work list is empty, nothing to harvest");
            return Ok(summary);
        }

        let fetched = self.download_phase(&keys, &mut summary).await;
        self.extraction_phase(&keys, &fetched, &mut summary).await?;

        if self.config.organize.postprocess_images {
            summary.geometry = self.geometry_phase()?;
            info!(
                "Geometry pass: {} images scanned, {} resized",
                summary.geometry.scanned, summary.geometry.resized
            );
        }

        if self.config.organize.organize_outputs {
            summary.organization = OutputOrganizer::new(self.config.export_dir()).organize()?;
            info!(
                "Organized {} units into the entity tree ({} skipped)",
                summary.organization.organized, summary.organization.skipped
            );
        }

        info!(
            "Harvest done: {} requested, {} downloaded, {} skipped, {} failed, {} extracted, {} exhausted",
            summary.requested,
            summary.downloaded,
            summary.download_skipped,
            summary.download_failed,
            summary.extracted,
            summary.exhausted
        );
        Ok(summary)
    }

    /// Refresh, then harvest the work list for `entity_ids` (falling back to
    /// the entities touched by the refresh diff when none are given).
    pub async fn run_all(&self, entity_ids: &[String]) -> Result<HarvestSummary> {
        let refresh = self.refresh().await?;
        let ids = if entity_ids.is_empty() {
            refresh.entity_ids
        } else {
            entity_ids.to_vec()
        };
        if ids.is_empty() {
            warn!("No changed entities and none requested, skipping harvest");
            return Ok(HarvestSummary::default());
        }
        self.build_worklist(&ids)?;
        self.harvest().await
    }

    /// Download every key on a bounded worker pool; returns per-key success.
    async fn download_phase(
        &self,
        keys: &[String],
        summary: &mut HarvestSummary,
    ) -> HashMap<String, bool> {
        let progress = ProgressBar::new(keys.len() as u64);
        let results: Vec<(String, Result<WriteOutcome, String>)> =
            futures::stream::iter(keys.iter().cloned())
                .map(|key| {
                    let progress = &progress;
                    async move {
                        let url = self.config.bundle_url(&key);
                        let dest = self.bundle_dest(&key);
                        let result = self
                            .retrier
                            .fetch_bundle(&url, &dest)
                            .await
                            .map_err(|e| e.to_string());
                        progress.inc(1);
                        (key, result)
                    }
                })
                .buffer_unordered(self.config.fetch.download_concurrency)
                .collect()
                .await;
        progress.finish_and_clear();

        let mut fetched = HashMap::new();
        for (key, result) in results {
            match result {
                Ok(WriteOutcome::Downloaded(_)) => {
                    summary.downloaded += 1;
                    fetched.insert(key, true);
                }
                Ok(WriteOutcome::Skipped) => {
                    summary.download_skipped += 1;
                    debug!("Already present, skipping download: {}", key);
                    fetched.insert(key, true);
                }
                Err(e) => {
                    summary.download_failed += 1;
                    warn!("Download failed for {}: {}", key, e);
                    fetched.insert(key, false);
                }
            }
        }
        fetched
    }

    /// Extract each fetched bundle through the escalation ladder and collect
    /// the winning output into its unit directory.
    async fn extraction_phase(
        &self,
        keys: &[String],
        fetched: &HashMap<String, bool>,
        summary: &mut HarvestSummary,
    ) -> Result<()> {
        let classifier = KeyClassifier::new(self.config.worklist.voice_count);
        let escalator = Escalator::new(&self.extractor, self.config.scratch_dir());
        let export_dir = self.config.export_dir();
        std::fs::create_dir_all(&export_dir)
            .with_context(|| format!("Failed to create export directory: {:?}", export_dir))?;

        for key in keys {
            if !fetched.get(key).copied().unwrap_or(false) {
                continue;
            }

            let category = classifier
                .classify(key)
                .map(|c| c.category)
                .unwrap_or(AssetCategory::Other);
            let job = ExtractionJob {
                bundle_key: key.clone(),
                bundle_path: self.bundle_dest(key),
                category,
            };

            match escalator.extract(&job).await {
                Ok(ExtractionOutcome::Success(found)) => {
                    debug!("Located output for {}: {:?}", key, found);
                    let unit_dir =
                        export_dir.join(format!("{}{}", sanitize_unit_name(key), UNIT_SUFFIX));
                    if unit_dir.exists() {
                        std::fs::remove_dir_all(&unit_dir).with_context(|| {
                            format!("Failed to replace unit directory {:?}", unit_dir)
                        })?;
                    }
                    std::fs::rename(escalator.scratch_dir(), &unit_dir).with_context(|| {
                        format!("Failed to collect extraction output into {:?}", unit_dir)
                    })?;
                    summary.extracted += 1;
                }
                Ok(ExtractionOutcome::Exhausted) => {
                    summary.exhausted += 1;
                }
                Err(e) => {
                    warn!("Extraction failed for {}: {:#}", key, e);
                    summary.exhausted += 1;
                }
            }
        }
        Ok(())
    }

    /// Apply the geometry rules to every unit under the export root.
    fn geometry_phase(&self) -> Result<GeometryReport> {
        let export_dir = self.config.export_dir();
        let mut report = GeometryReport::default();

        let entries = std::fs::read_dir(&export_dir)
            .with_context(|| format!("Failed to read export directory: {:?}", export_dir))?;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if !path.is_dir() || !name.ends_with(UNIT_SUFFIX) {
                continue;
            }
            let stem = name.trim_end_matches(UNIT_SUFFIX);
            report.merge(normalize_unit_images(&path, stem));
        }
        Ok(report)
    }

    /// Extract the manifest index text out of the downloaded index bundle.
    async fn extract_index_text(&self, bundle_path: &std::path::Path) -> Result<String> {
        let manifest_type = self.config.manifest_type;
        let scratch = self.config.scratch_dir();
        clear_dir(&scratch)
            .with_context(|| format!("Failed to reset scratch directory {:?}", scratch))?;

        let filters = ExtractFilters::types(&["TextAsset"]).with_export_type("Raw");
        let exit = self
            .extractor
            .run(bundle_path, &scratch, &filters)
            .await
            .context("Failed to invoke extractor on the manifest index")?;
        if !exit.success() {
            bail!(
                "Extractor failed on the manifest index (exit {:?})",
                exit.code
            );
        }

        let wanted = manifest_type.index_text_name();
        let found = find_named_file(&scratch, &wanted)
            .with_context(|| format!("Extractor produced no {wanted} for the manifest index"))?;

        let bytes = std::fs::read(&found)
            .with_context(|| format!("Failed to read extracted index text: {:?}", found))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn bundle_dest(&self, key: &str) -> PathBuf {
        self.config
            .download_dir()
            .join(sanitize_unit_name(&format!("{key}.unity3d")))
    }
}

/// Find a file by exact (case-insensitive) name, shortest path first.
fn find_named_file(dir: &std::path::Path, name: &str) -> Option<PathBuf> {
    let mut hits: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().eq_ignore_ascii_case(name))
        .map(|e| e.into_path())
        .collect();
    hits.sort_by(|a, b| {
        let la = a.as_os_str().len();
        let lb = b.as_os_str().len();
        la.cmp(&lb).then_with(|| a.cmp(b))
    });
    hits.into_iter().next()
}
