//! vismap CLI
//!
//! Builds photon visibility maps from simulated detector events and joins
//! per-point shards into a single map.
#![allow(clippy::uninlined_format_args)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use thiserror::Error;
use vismap_core::{AggregationMode, VisConfig};
use vismap_io::{default_output_path, BuildSummary, DEFAULT_JOIN_OUTPUT};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    VismapIo(#[from] vismap_io::Error),

    #[error("configuration error: {0}")]
    Core(#[from] vismap_core::Error),
}

/// Per-sensor aggregation convention.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Sum sensor hits over every event of a point, then normalize
    Incremental,
    /// One event per point; sensor value is that event's normalized count
    Batch,
}

impl From<Mode> for AggregationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Incremental => Self::Incremental,
            Mode::Batch => Self::Batch,
        }
    }
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-sensor aggregation mode (overrides the config file)
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Photons emitted per simulated event (overrides the config file)
    #[arg(long)]
    photons_per_event: Option<f64>,

    /// Number of shard stores kept open while joining (overrides the config file)
    #[arg(long)]
    cache_capacity: Option<usize>,
}

impl CommonArgs {
    fn resolve(&self) -> Result<VisConfig> {
        let mut config = match &self.config {
            Some(path) => VisConfig::from_file(path)?,
            None => VisConfig::default(),
        };
        if let Some(mode) = self.mode {
            config = config.with_mode(mode.into());
        }
        if let Some(photons) = self.photons_per_event {
            config = config.with_photons_per_event(photons);
        }
        if let Some(capacity) = self.cache_capacity {
            config = config.with_cache_capacity(capacity);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Photon visibility map builder.
#[derive(Parser)]
#[command(name = "vismap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate an event stream into one visibility record per emission point
    BuildVisTree {
        /// Input event stream (JSON documents, one per event)
        #[arg(short, long)]
        input: PathBuf,

        /// Output store (defaults to <input stem>_ntuple.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Join the shard records listed in a JSON manifest into one map
    BuildVisMap {
        /// Manifest of {"entry", "filepath"} objects
        #[arg(short, long)]
        json_filemap: PathBuf,

        /// Output store
        #[arg(short, long, default_value = DEFAULT_JOIN_OUTPUT)]
        output: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Build a photon library from a list of event streams (batch mode)
    BuildPhotonLibrary {
        /// Text file listing one event stream per line
        #[arg(short, long)]
        input_list: PathBuf,

        /// Output store
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let start = Instant::now();

    match cli.command {
        Commands::BuildVisTree {
            input,
            output,
            common,
        } => {
            let config = common.resolve()?;
            let output = output.unwrap_or_else(|| default_output_path(&input));
            let summary = vismap_io::build_from_file(&input, &output, &config)?;
            print_build_summary(&summary, &output, start);
        }

        Commands::BuildVisMap {
            json_filemap,
            output,
            common,
        } => {
            let config = common.resolve()?;
            let summary = vismap_io::join_files(&json_filemap, &output, &config)?;
            println!(
                "Joined {} of {} entries in {:.2}s ({} skipped)",
                summary.written,
                summary.requested,
                start.elapsed().as_secs_f64(),
                summary.skipped
            );
            println!("Output: {}", output.display());
        }

        Commands::BuildPhotonLibrary {
            input_list,
            output,
            common,
        } => {
            let config = common.resolve()?;
            if config.mode != AggregationMode::Batch {
                log::debug!("photon library always aggregates in batch mode");
            }
            let summary = vismap_io::build_photon_library(&input_list, &output, &config)?;
            print_build_summary(&summary, &output, start);
        }
    }

    Ok(())
}

fn print_build_summary(summary: &BuildSummary, output: &Path, start: Instant) {
    println!(
        "Processed {} events in {:.2}s",
        summary.events,
        start.elapsed().as_secs_f64()
    );
    println!("Points written: {}", summary.points);
    println!("Output: {}", output.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsStr;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build_vis_map_defaults() {
        let cli = Cli::try_parse_from(["vismap", "build-vis-map", "--json-filemap", "m.json"])
            .unwrap();
        match cli.command {
            Commands::BuildVisMap { output, common, .. } => {
                assert_eq!(output, PathBuf::from("vis_map.vmap"));
                assert!(common.config.is_none());
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli = Cli::try_parse_from([
            "vismap",
            "build-vis-tree",
            "--input",
            "events.json",
            "--mode",
            "batch",
            "--photons-per-event",
            "500",
            "--cache-capacity",
            "3",
        ])
        .unwrap();
        let Commands::BuildVisTree { common, output, .. } = cli.command else {
            panic!("wrong subcommand");
        };
        assert!(output.is_none());
        let config = common.resolve().unwrap();
        assert_eq!(config.mode, AggregationMode::Batch);
        assert_eq!(config.photons_per_event, 500.0);
        assert_eq!(config.cache_capacity, 3);
    }

    #[test]
    fn test_missing_input_fails_run() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("absent.json");
        let output = dir.path().join("out.vmap");
        let cli = Cli::try_parse_from([
            OsStr::new("vismap"),
            OsStr::new("build-vis-tree"),
            OsStr::new("--input"),
            input.as_os_str(),
            OsStr::new("--output"),
            output.as_os_str(),
        ])
        .unwrap();

        let err = run(cli).unwrap_err();
        assert!(matches!(
            err,
            CliError::VismapIo(vismap_io::Error::FatalInput { .. })
        ));
        assert!(err.to_string().contains("absent.json"), "{err}");
        assert!(!output.exists());
    }

    #[test]
    fn test_unreadable_manifest_fails_run() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("missing_filemap.json");
        let cli = Cli::try_parse_from([
            OsStr::new("vismap"),
            OsStr::new("build-vis-map"),
            OsStr::new("--json-filemap"),
            manifest.as_os_str(),
        ])
        .unwrap();

        let err = run(cli).unwrap_err();
        assert!(err.to_string().contains("missing_filemap.json"), "{err}");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cli = Cli::try_parse_from([
            "vismap",
            "build-photon-library",
            "--input-list",
            "list.txt",
            "--output",
            "lib.vmap",
            "--cache-capacity",
            "0",
        ])
        .unwrap();
        let Commands::BuildPhotonLibrary { common, .. } = cli.command else {
            panic!("wrong subcommand");
        };
        assert!(common.resolve().is_err());
    }
}
