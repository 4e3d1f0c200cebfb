use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use clap::Parser;
use serde::{Deserialize, Serialize};

use thiserror::Error;

use tracing::{debug, info};

use mzpip::aggregate::{aggregate, AggregationParams, CombinedTable, RecordOrigin};
use mzpip::api::DEFAULT_NEIGHBORS;
use mzpip::io::{read_run_groups, InputError, InputFiles};
use mzpip::scorer::ScoreType;
use mzpip::{
    AttributeSet, FeatureTables, PropagationEngine, PropagationParams, PropagationSummary,
    RunGroups,
};

use crate::args::{non_negative_float_f64, positive_usize, OutputLayout};
use crate::write::write_output;

#[derive(Debug, Error)]
pub enum MZPiperError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error(transparent)]
    InputError(#[from] InputError),
    #[error("Failed to write the output table: {0}")]
    OutputError(
        #[source]
        #[from]
        csv::Error,
    ),
    #[error("Failed to resolve the configuration: {0}")]
    ConfigurationError(
        #[source]
        #[from]
        figment::Error,
    ),
    #[error("Failed to build the thread pool: {0}")]
    ThreadPoolError(
        #[source]
        #[from]
        rayon::ThreadPoolBuildError,
    ),
}

/// Propagate peptide identifications between label-free mass spectrometry runs.
///
/// Read the MaxQuant `evidence` and `allPeptides` tables from a directory, transfer
/// identifications onto unidentified MS1 features of the runs they are missing from,
/// and write the combined intensity table.
#[derive(Parser, Debug, Clone, Deserialize, Serialize)]
#[command(author, version)]
#[serde(default)]
pub struct MZPiper {
    /// The directory containing the `evidence` and `allPeptides` tables
    #[arg()]
    pub input_dir: PathBuf,

    /// The path to write the output table to, or if '-' is passed, write to STDOUT.
    ///
    /// If the path ends with `.gz`, the table is gzip compressed.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `mzpiper.toml` in the working directory.
    /// Environment variables prefixed with `MZPIPER_` will be read too.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short='t',
        long="threads",
        default_value_t=-1,
    )]
    pub threads: i32,

    /// The number of nearest unidentified features to consider for each missing identification
    #[arg(
        short = 'k',
        long = "neighbors",
        default_value_t = DEFAULT_NEIGHBORS,
        value_parser = positive_usize,
    )]
    pub k: usize,

    /// Discard propagated identities whose probability is at or below this value
    #[arg(
        short = 'p',
        long = "thresh",
        default_value_t = 0.0,
        value_parser = non_negative_float_f64,
        allow_negative_numbers = true,
    )]
    pub thresh: ScoreType,

    /// Whether to leave out the observation weight column
    #[arg(
        long = "skip-weights",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_name = "BOOL",
    )]
    pub skip_weights: bool,

    /// Describe feature shape by the ion mobility index instead of the isotopic peak count
    #[arg(long = "tims-ms")]
    pub tims_ms: bool,

    /// A table mapping each run (`Raw file`) to an experimental `Group`.
    ///
    /// When given, identifications only propagate between runs of the same group.
    #[arg(short = 'g', long = "group-file")]
    pub group_file: Option<PathBuf>,

    /// The layout of the output table
    #[arg(long = "layout", default_value_t = OutputLayout::Long)]
    pub layout: OutputLayout,
}

impl Default for MZPiper {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_file: PathBuf::from("-"),
            log_file: None,
            config_file: None,
            threads: -1,
            k: DEFAULT_NEIGHBORS,
            thresh: 0.0,
            skip_weights: true,
            tims_ms: false,
            group_file: None,
            layout: OutputLayout::Long,
        }
    }
}

impl MZPiper {
    fn create_threadpool(&self) -> Result<rayon::ThreadPool, MZPiperError> {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism()?.into()
        };
        debug!("Using {} cores", num_threads);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?;
        Ok(pool)
    }

    pub fn attributes(&self) -> AttributeSet {
        AttributeSet::from_tims_ms(self.tims_ms)
    }

    pub fn propagation_params(&self) -> PropagationParams {
        PropagationParams {
            k: self.k,
            ..Default::default()
        }
    }

    pub fn aggregation_params(&self) -> AggregationParams {
        AggregationParams::new(self.thresh, self.skip_weights)
    }

    pub fn main(&self) -> Result<(), MZPiperError> {
        info!(
            "mzpiper v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        info!("Input: {}", self.input_dir.display());
        info!("Output: {}", self.output_file.display());
        if let Ok(config) = toml::to_string_pretty(self) {
            debug!("Configuration:\n{config}");
        }
        self.create_threadpool()?.install(|| self.run_workflow())
    }

    fn load_groups(&self) -> Result<RunGroups, MZPiperError> {
        match self.group_file.as_ref() {
            Some(path) => {
                let groups = read_run_groups(path)?;
                debug!("Read run groups from {}", path.display());
                Ok(groups)
            }
            None => Ok(RunGroups::default()),
        }
    }

    fn run_workflow(&self) -> Result<(), MZPiperError> {
        let start = Instant::now();
        let files = InputFiles::discover(&self.input_dir)?;
        let groups = self.load_groups()?;

        let (identifications, detections) = files.read(&self.attributes())?;
        let tables = FeatureTables::new(identifications, detections);
        let counts = tables.counts();
        info!(
            "Identifications: {} | Detections: {} | Runs: {}",
            counts.identifications,
            counts.detections,
            tables.runs().len()
        );
        info!(
            "Identified Features: {} | Unidentified Features: {}",
            counts.identified_features, counts.unidentified_features
        );

        let engine =
            PropagationEngine::new(&tables, self.propagation_params()).with_groups(groups);
        let result = engine.propagate_all();
        let (table, summary) = aggregate(&tables, result, &self.aggregation_params());
        let processing_elapsed = start.elapsed();
        self.report(&summary, &table);
        info!("Elapsed Time: {:0.3?}", processing_elapsed);

        write_output(&self.output_file, &table, self.layout)?;

        let elapsed = start.elapsed();
        if (elapsed.as_secs_f64() - processing_elapsed.as_secs_f64()) > 2.0 {
            info!("Total Elapsed Time: {:0.3?}", elapsed);
        }
        Ok(())
    }

    fn report(&self, summary: &PropagationSummary, table: &CombinedTable) {
        info!(
            "Runs Processed: {} | Skipped: {} (no missing identifications: {}, too few candidates: {})",
            summary.runs_processed,
            summary.runs_skipped(),
            summary.runs_without_features,
            summary.runs_insufficient_candidates
        );
        info!(
            "Prototypes: {} | Degenerate Rows: {}",
            summary.prototypes, summary.degenerate_rows
        );
        info!(
            "Propagated Identities: {} | Low Confidence Discarded: {}",
            summary.propagated.saturating_sub(summary.low_confidence),
            summary.low_confidence
        );
        info!(
            "Output Records: {} identified, {} propagated",
            table.count_origin(RecordOrigin::Identified),
            table.count_origin(RecordOrigin::Propagated)
        );
    }
}
