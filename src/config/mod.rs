mod file_config;

pub use file_config::{
    ExtractorConfig, FetchConfig, FileConfig, OrganizeConfig, WorkListFileConfig,
};

use crate::classify::WorkListOptions;
use crate::manifest::ManifestType;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// Default remote asset host serving the bundles.
pub const DEFAULT_BASE_URL: &str = "https://img.wcat.colopl.jp/assets/2020/a/";

/// Extension of the remote bundle containers.
pub const BUNDLE_EXT: &str = "unity3d";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub work_dir: PathBuf,
    pub manifest_type: ManifestType,
    pub base_url: Option<String>,
    pub extractor_cli: Option<PathBuf>,
    pub timeout_sec: u64,
    pub retries: u32,
    pub skip_existing: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("harvest_work"),
            manifest_type: ManifestType::Card,
            base_url: None,
            extractor_cli: None,
            timeout_sec: 30,
            retries: 3,
            skip_existing: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub work_dir: PathBuf,
    pub manifest_type: ManifestType,
    pub fetch: FetchSettings,
    pub extractor: ExtractorSettings,
    pub worklist: WorkListOptions,
    pub organize: OrganizeSettings,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Base URL, normalized to end with a single `/`.
    pub base_url: String,
    pub timeout_sec: u64,
    pub retries: u32,
    pub skip_existing: bool,
    /// Bounded worker pool size for the download phase.
    pub download_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub cli_path: PathBuf,
    pub game: String,
    pub export_type: String,
    pub extra_args: String,
}

#[derive(Debug, Clone)]
pub struct OrganizeSettings {
    pub postprocess_images: bool,
    pub organize_outputs: bool,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let work_dir = file
            .work_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.work_dir.clone());

        let manifest_type = match file.manifest_type {
            Some(s) => parse_manifest_type(&s)?,
            None => cli.manifest_type,
        };

        let fetch_file = file.fetch.unwrap_or_default();
        let fetch = FetchSettings {
            base_url: normalize_base_url(
                &fetch_file
                    .base_url
                    .or_else(|| cli.base_url.clone())
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            ),
            timeout_sec: fetch_file.timeout_sec.unwrap_or(cli.timeout_sec),
            retries: fetch_file.retries.unwrap_or(cli.retries),
            skip_existing: fetch_file.skip_existing.unwrap_or(cli.skip_existing),
            download_concurrency: fetch_file.download_concurrency.unwrap_or(4).max(1),
        };

        let extractor_file = file.extractor.unwrap_or_default();
        let extractor = ExtractorSettings {
            cli_path: extractor_file
                .cli_path
                .map(PathBuf::from)
                .or_else(|| cli.extractor_cli.clone())
                .unwrap_or_else(|| PathBuf::from("AssetStudio/AssetStudioCLI")),
            game: extractor_file.game.unwrap_or_else(|| "Normal".to_string()),
            export_type: extractor_file
                .export_type
                .unwrap_or_else(|| "Convert".to_string()),
            extra_args: extractor_file
                .extra_args
                .unwrap_or_else(|| "--silent".to_string()),
        };

        let wl_file = file.worklist.unwrap_or_default();
        let wl_defaults = WorkListOptions::default();
        let worklist = WorkListOptions {
            include_icon: wl_file.include_icon.unwrap_or(wl_defaults.include_icon),
            include_bust: wl_file.include_bust.unwrap_or(wl_defaults.include_bust),
            include_full: wl_file.include_full.unwrap_or(wl_defaults.include_full),
            include_evol: wl_file.include_evol.unwrap_or(wl_defaults.include_evol),
            include_voice: wl_file.include_voice.unwrap_or(wl_defaults.include_voice),
            include_prefab: wl_file
                .include_prefab
                .unwrap_or(wl_defaults.include_prefab),
            force_required_categories: wl_file
                .force_required_categories
                .unwrap_or(wl_defaults.force_required_categories),
            voice_count: wl_file.voice_count.unwrap_or(wl_defaults.voice_count),
        };

        let organize_file = file.organize.unwrap_or_default();
        let organize = OrganizeSettings {
            postprocess_images: organize_file.postprocess_images.unwrap_or(true),
            organize_outputs: organize_file.organize_outputs.unwrap_or(true),
        };

        Ok(Self {
            work_dir,
            manifest_type,
            fetch,
            extractor,
            worklist,
            organize,
        })
    }

    /// Fail fast when the external extractor binary is not where the
    /// configuration says it is. Called before any network work starts.
    pub fn validate_extractor(&self) -> Result<()> {
        if !self.extractor.cli_path.exists() {
            bail!(
                "Extractor CLI not found: {:?} (set extractor.cli_path in the config file)",
                self.extractor.cli_path
            );
        }
        Ok(())
    }

    pub fn store_dir(&self) -> PathBuf {
        self.work_dir.join("index_store")
    }

    pub fn download_dir(&self) -> PathBuf {
        self.work_dir.join("downloads")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.work_dir.join("export")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.work_dir.join("scratch")
    }

    pub fn work_list_path(&self) -> PathBuf {
        self.work_dir.join("card_txt").join("card.txt")
    }

    /// URL of a bundle on the remote host.
    pub fn bundle_url(&self, bundle_key: &str) -> String {
        format!("{}{}.{}", self.fetch.base_url, bundle_key, BUNDLE_EXT)
    }
}

/// Ensure a single trailing slash so key concatenation is well-formed.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    format!("{trimmed}/")
}

fn parse_manifest_type(s: &str) -> Result<ManifestType> {
    match s.to_ascii_lowercase().as_str() {
        "card" => Ok(ManifestType::Card),
        "area" => Ok(ManifestType::Area),
        "item" => Ok(ManifestType::Item),
        "event" => Ok(ManifestType::Event),
        other => bail!("Unknown manifest_type in config file: {other:?}"),
    }
}
