use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub work_dir: Option<String>,
    pub manifest_type: Option<String>,

    // Stage configs
    pub fetch: Option<FetchConfig>,
    pub extractor: Option<ExtractorConfig>,
    pub worklist: Option<WorkListFileConfig>,
    pub organize: Option<OrganizeConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: Option<String>,
    pub timeout_sec: Option<u64>,
    pub retries: Option<u32>,
    pub skip_existing: Option<bool>,
    pub download_concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ExtractorConfig {
    pub cli_path: Option<String>,
    pub game: Option<String>,
    pub export_type: Option<String>,
    pub extra_args: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WorkListFileConfig {
    pub include_icon: Option<bool>,
    pub include_bust: Option<bool>,
    pub include_full: Option<bool>,
    pub include_evol: Option<bool>,
    pub include_voice: Option<bool>,
    pub include_prefab: Option<bool>,
    pub force_required_categories: Option<bool>,
    pub voice_count: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct OrganizeConfig {
    pub postprocess_images: Option<bool>,
    pub organize_outputs: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
