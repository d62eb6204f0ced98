//! Process invocation over the external extractor CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Filters for one extractor invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractFilters {
    /// Asset type filters, each passed as its own `--types` argument.
    /// `None` means no type filter (full dump).
    pub types: Option<Vec<String>>,
    /// Container-name regex scoping the invocation to one bundle key.
    pub containers: Option<String>,
    /// Export mode override; falls back to the extractor's configured mode.
    pub export_type: Option<String>,
}

impl ExtractFilters {
    pub fn types(types: &[&str]) -> Self {
        Self {
            types: Some(types.iter().map(|t| t.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn with_containers(mut self, regex: String) -> Self {
        self.containers = Some(regex);
        self
    }

    pub fn with_export_type(mut self, export_type: &str) -> Self {
        self.export_type = Some(export_type.to_string());
        self
    }
}

/// Exit status of an extractor invocation. Advisory only: the extractor may
/// return success with no relevant output, or non-zero with usable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorExit {
    pub code: Option<i32>,
}

impl ExtractorExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Capability trait over the extractor process, so the escalation policy can
/// be exercised against a scripted implementation in tests.
#[async_trait]
pub trait BundleExtractor: Send + Sync {
    async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        filters: &ExtractFilters,
    ) -> std::io::Result<ExtractorExit>;
}

/// The real extractor: spawns the configured CLI binary.
pub struct CliExtractor {
    cli_path: PathBuf,
    game: String,
    export_type: String,
    extra_args: Vec<String>,
}

impl CliExtractor {
    /// `extra_args` is a single configured string, shlex-split into argv
    /// entries (falling back to whitespace splitting if quoting is broken).
    pub fn new(cli_path: PathBuf, game: &str, export_type: &str, extra_args: &str) -> Self {
        let extra_args = shlex::split(extra_args)
            .unwrap_or_else(|| extra_args.split_whitespace().map(String::from).collect());
        Self {
            cli_path,
            game: game.to_string(),
            export_type: export_type.to_string(),
            extra_args,
        }
    }

    pub fn cli_path(&self) -> &Path {
        &self.cli_path
    }

    fn build_args(&self, input: &Path, output_dir: &Path, filters: &ExtractFilters) -> Vec<String> {
        let export_type = filters.export_type.as_deref().unwrap_or(&self.export_type);
        let mut args = vec![
            input.to_string_lossy().into_owned(),
            output_dir.to_string_lossy().into_owned(),
            "--game".to_string(),
            self.game.clone(),
            "--export_type".to_string(),
            export_type.to_string(),
        ];
        if let Some(containers) = &filters.containers {
            args.push("--containers".to_string());
            args.push(containers.clone());
        }
        if let Some(types) = &filters.types {
            for t in types {
                args.push("--types".to_string());
                args.push(t.clone());
            }
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl BundleExtractor for CliExtractor {
    async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        filters: &ExtractFilters,
    ) -> std::io::Result<ExtractorExit> {
        tokio::fs::create_dir_all(output_dir).await?;

        let args = self.build_args(input, output_dir, filters);
        debug!("Extractor: {:?} {}", self.cli_path, args.join(" "));

        let status = Command::new(&self.cli_path).args(&args).status().await?;
        Ok(ExtractorExit {
            code: status.code(),
        })
    }
}
