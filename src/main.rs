use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use asset_harvester::config::{AppConfig, CliConfig, FileConfig};
use asset_harvester::manifest::ManifestType;
use asset_harvester::pipeline::production_pipeline;

lazy_static! {
    static ref ENTITY_ID_ARG_RE: Regex = Regex::new(r"^\d{8}$").expect("invalid id pattern");
}

#[derive(Parser, Debug)]
#[command(name = "asset-harvester", version, about = "Remote bundle manifest resolver and extraction pipeline")]
struct CliArgs {
    /// Path to a TOML config file; its values override CLI flags.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Working directory holding downloads, snapshots and the export tree.
    #[clap(long, default_value = "harvest_work")]
    work_dir: PathBuf,

    /// Manifest type to operate on.
    #[clap(long, value_enum, default_value = "card")]
    manifest_type: ManifestType,

    /// Base URL of the remote asset host.
    #[clap(long)]
    base_url: Option<String>,

    /// Path to the extractor CLI binary.
    #[clap(long)]
    extractor_cli: Option<PathBuf>,

    /// Per-attempt network timeout in seconds.
    #[clap(long, default_value_t = 30)]
    timeout_sec: u64,

    /// Number of download attempts per bundle.
    #[clap(long, default_value_t = 3)]
    retries: u32,

    /// Skip downloads whose destination already matches the remote size.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    skip_existing: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture the remote manifest, diff against the baseline, commit it.
    Refresh,

    /// Build the work list for the given entity IDs from the current snapshot.
    Worklist {
        /// 8-digit entity IDs.
        #[clap(long = "id")]
        ids: Vec<String>,

        /// File with one 8-digit entity ID per line.
        #[clap(long)]
        id_file: Option<PathBuf>,
    },

    /// Download, extract and organize everything on the work list.
    Harvest,

    /// Refresh, then harvest (entities from the diff when none are given).
    Run {
        /// 8-digit entity IDs.
        #[clap(long = "id")]
        ids: Vec<String>,

        /// File with one 8-digit entity ID per line.
        #[clap(long)]
        id_file: Option<PathBuf>,
    },
}

/// Collect and validate entity IDs from repeated flags and an optional file.
fn collect_entity_ids(ids: &[String], id_file: Option<&PathBuf>) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();

    for id in ids {
        let id = id.trim();
        if !ENTITY_ID_ARG_RE.is_match(id) {
            bail!("Invalid entity ID (expected 8 digits): {id:?}");
        }
        out.push(id.to_string());
    }

    if let Some(path) = id_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ID file: {:?}", path))?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !ENTITY_ID_ARG_RE.is_match(line) {
                bail!("Invalid entity ID in {:?} (expected 8 digits): {line:?}", path);
            }
            out.push(line.to_string());
        }
    }

    let mut seen = std::collections::HashSet::new();
    out.retain(|id| seen.insert(id.clone()));
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let cli_config = CliConfig {
        work_dir: cli_args.work_dir.clone(),
        manifest_type: cli_args.manifest_type,
        base_url: cli_args.base_url.clone(),
        extractor_cli: cli_args.extractor_cli.clone(),
        timeout_sec: cli_args.timeout_sec,
        retries: cli_args.retries,
        skip_existing: cli_args.skip_existing,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;
    info!("Working directory: {:?}", config.work_dir);

    let pipeline = production_pipeline(config);

    match &cli_args.command {
        Command::Refresh => {
            pipeline.refresh().await?;
        }
        Command::Worklist { ids, id_file } => {
            let entity_ids = collect_entity_ids(ids, id_file.as_ref())?;
            if entity_ids.is_empty() {
                bail!("No entity IDs given (use --id or --id-file)");
            }
            pipeline.build_worklist(&entity_ids)?;
        }
        Command::Harvest => {
            pipeline.harvest().await?;
        }
        Command::Run { ids, id_file } => {
            let entity_ids = collect_entity_ids(ids, id_file.as_ref())?;
            pipeline.run_all(&entity_ids).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_entity_ids_validates_format() {
        assert!(collect_entity_ids(&["20413550".to_string()], None).is_ok());
        assert!(collect_entity_ids(&["not-an-id".to_string()], None).is_err());
        assert!(collect_entity_ids(&["1234".to_string()], None).is_err());
    }

    #[test]
    fn test_collect_entity_ids_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "# heroes\n20413550\n\n10020101\n").unwrap();

        let ids = collect_entity_ids(&[], Some(&path)).unwrap();
        assert_eq!(ids, vec!["20413550", "10020101"]);
    }

    #[test]
    fn test_collect_entity_ids_rejects_bad_file_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "20413550\nbogus\n").unwrap();
        assert!(collect_entity_ids(&[], Some(&path)).is_err());
    }
}
