//! Shared fakes and fixtures for end-to-end pipeline tests.
//!
//! The pipeline's two external collaborators (the remote host and the
//! extractor process) are capability traits; these scripted implementations
//! let full runs execute against a temp directory with no network and no
//! real extractor binary.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use asset_harvester::config::{
    AppConfig, CliConfig, ExtractorConfig, FileConfig, OrganizeConfig,
};
use asset_harvester::extract::{BundleExtractor, ExtractFilters, ExtractorExit};
use asset_harvester::fetch::{BundleHost, FetchedBody, TransportError};

/// A payload that passes the bundle magic check.
pub fn unity_payload(tag: &str) -> Vec<u8> {
    format!("UnityFS\x00{tag}").into_bytes()
}

/// Host serving the same valid payload for every URL.
pub struct FakeHost {
    payload: Vec<u8>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            payload: unity_payload("fake"),
        }
    }
}

#[async_trait]
impl BundleHost for FakeHost {
    async fn probe_content_length(&self, _url: &str) -> Option<u64> {
        Some(self.payload.len() as u64)
    }

    async fn get(&self, _url: &str) -> Result<FetchedBody, TransportError> {
        Ok(FetchedBody {
            status: 200,
            bytes: self.payload.clone(),
        })
    }
}

/// Extractor producing canned output files keyed by the input bundle's file
/// name. Inputs with no scripted output produce nothing at any level.
pub struct FakeExtractor {
    outputs: HashMap<String, Vec<(String, Vec<u8>)>>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
        }
    }

    /// Script an output file (relative to the output dir) for a bundle.
    pub fn with_output(mut self, input_name: &str, rel_path: &str, content: &[u8]) -> Self {
        self.outputs
            .entry(input_name.to_string())
            .or_default()
            .push((rel_path.to_string(), content.to_vec()));
        self
    }
}

#[async_trait]
impl BundleExtractor for FakeExtractor {
    async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        _filters: &ExtractFilters,
    ) -> std::io::Result<ExtractorExit> {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(files) = self.outputs.get(&name) {
            for (rel, content) in files {
                let path = output_dir.join(rel);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, content)?;
            }
        }
        Ok(ExtractorExit { code: Some(0) })
    }
}

/// Resolve a test config rooted at `work_dir`, with a dummy extractor binary
/// on disk (the fakes never spawn it, but the path must exist) and image
/// postprocessing off so no real PNGs are needed.
pub fn test_config(work_dir: &Path) -> AppConfig {
    std::fs::create_dir_all(work_dir).unwrap();
    let fake_cli = work_dir.join("fake-extractor");
    std::fs::write(&fake_cli, b"#!/bin/sh\n").unwrap();

    let cli = CliConfig {
        work_dir: work_dir.to_path_buf(),
        ..Default::default()
    };
    let file = FileConfig {
        extractor: Some(ExtractorConfig {
            cli_path: Some(fake_cli.to_string_lossy().into_owned()),
            ..Default::default()
        }),
        organize: Some(OrganizeConfig {
            postprocess_images: Some(false),
            organize_outputs: Some(true),
        }),
        ..Default::default()
    };
    AppConfig::resolve(&cli, Some(file)).unwrap()
}

/// Write a work list under the config's expected path.
pub fn write_work_list(config: &AppConfig, keys: &[&str]) -> PathBuf {
    let path = config.work_list_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut content = keys.join("\n");
    content.push('\n');
    std::fs::write(&path, content).unwrap();
    path
}
