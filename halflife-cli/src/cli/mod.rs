//! CLI command definitions and handlers

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use crate::burndown::{combine, BurndownConfig, BurndownResult, DEFAULT_GRANULARITY};
use crate::reporters::{self, ReportFormat};
use crate::{analyze, reporters::json};

/// Halflife - line burndown analysis for git repositories
///
/// Tracks, for every line of every file, when it was written and by whom,
/// and reports how much of each era's code is still alive over time.
#[derive(Parser, Debug)]
#[command(name = "halflife")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the repository (default: current directory)
    #[arg(global = true, default_value = ".")]
    pub path: PathBuf,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute the line burndown matrices for the repository
    Analyze {
        /// Output column band width, in days
        #[arg(long, default_value_t = DEFAULT_GRANULARITY)]
        granularity: u32,

        /// Days between output rows; clamped to the granularity
        #[arg(long, default_value_t = DEFAULT_GRANULARITY)]
        sampling: u32,

        /// Also produce per-file history matrices
        #[arg(long)]
        track_files: bool,

        /// Also produce per-author histories and the interaction matrix
        #[arg(long)]
        people: bool,

        /// Validate internal invariants after every mutation (slow)
        #[arg(long)]
        debug: bool,

        /// Output format
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Combine two JSON analysis results into one
    Combine {
        /// First result file, as produced by `analyze --format json`
        first: PathBuf,

        /// Second result file
        second: PathBuf,

        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze {
            granularity,
            sampling,
            track_files,
            people,
            debug,
            format,
            output,
        } => {
            let Some(format) = ReportFormat::from_name(&format) else {
                bail!("unknown output format: {}", format);
            };
            let config = BurndownConfig {
                granularity,
                sampling,
                track_files,
                track_people: people,
                debug,
            };
            let result = analyze::run(&cli.path, &config)?;
            let mut writer = open_output(output.as_deref())?;
            reporters::write_report(&result, format, writer.as_mut())
        }
        Commands::Combine {
            first,
            second,
            output,
        } => {
            let r1 = json::read(&first)?;
            let r2 = json::read(&second)?;
            let merged: BurndownResult = combine::merge_results(r1, r2);
            let mut writer = open_output(output.as_deref())?;
            json::write(&merged, writer.as_mut())
        }
    }
}

fn open_output(path: Option<&std::path::Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create output file {:?}", path))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    })
}
