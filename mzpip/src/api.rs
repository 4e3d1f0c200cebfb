//! High level APIs for running peptide identity propagation
use std::ops::{Add, AddAssign};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::feature::{FeatureEmbedding, PeptideFeature};
use crate::neighbors::find_nearest_neighbors;
use crate::partition::{RunGroups, RunPartition};
use crate::scorer::{ConfidenceScorer, ScoreNormalization};
use crate::solution::{select_assignments, PropagatedIdentity};
use crate::tables::FeatureTables;

/// The default number of neighbors retrieved for each prototype
pub const DEFAULT_NEIGHBORS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropagationParams {
    /// The number of candidate features retrieved for each prototype
    pub k: usize,
    pub normalization: ScoreNormalization,
}

impl PropagationParams {
    pub fn new(k: usize, normalization: ScoreNormalization) -> Self {
        Self { k, normalization }
    }
}

impl Default for PropagationParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_NEIGHBORS,
            normalization: ScoreNormalization::MaskedSum,
        }
    }
}

/// Reasons a single run contributes no propagated identities. None of them stop the other runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropagationError {
    #[error("Run {run} has {available} unidentified features, fewer than the {k} neighbors requested")]
    InsufficientCandidates {
        run: String,
        available: usize,
        k: usize,
    },
    #[error("Run {run} has no missing identifications or no unidentified features")]
    NoAvailableFeatures { run: String },
}

/// The identities propagated into a single run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunPropagation {
    pub run: String,
    pub identities: Vec<PropagatedIdentity>,
    pub prototypes: usize,
    pub degenerate_rows: usize,
}

/// Propagate identities from other runs onto the unidentified features of `run`.
///
/// This only reads from `tables`, so it may be run for many runs concurrently.
#[instrument(level = "debug", skip(tables, params, groups))]
pub fn propagate(
    run: &str,
    tables: &FeatureTables,
    params: &PropagationParams,
    groups: &RunGroups,
) -> Result<RunPropagation, PropagationError> {
    let partition = RunPartition::new(tables, run, groups);
    if partition.is_empty() {
        return Err(PropagationError::NoAvailableFeatures {
            run: run.to_string(),
        });
    }
    let prototypes = partition.prototypes(tables, groups);
    if prototypes.is_empty() {
        return Err(PropagationError::NoAvailableFeatures {
            run: run.to_string(),
        });
    }

    let queries: &[&PeptideFeature] = &partition.query_features;
    let prototype_points: Vec<FeatureEmbedding> =
        prototypes.iter().map(|p| p.feature.embedding()).collect();
    let query_points: Vec<FeatureEmbedding> = queries.iter().map(|q| q.embedding()).collect();

    let table = find_nearest_neighbors(&prototype_points, &query_points, params.k).map_err(
        |e| PropagationError::InsufficientCandidates {
            run: run.to_string(),
            available: e.available,
            k: e.k,
        },
    )?;

    let prototype_charges: Vec<i32> = prototypes.iter().map(|p| p.charge()).collect();
    let query_charges: Vec<i32> = queries.iter().map(|q| q.charge).collect();
    let probabilities = ConfidenceScorer::new(params.normalization).score(
        &table,
        &prototype_charges,
        &query_charges,
    );

    let assignments = select_assignments(&prototypes, queries, &table, &probabilities);
    if assignments.degenerate_rows > 0 {
        warn!(
            "Dropped {} of {} prototypes in {run} with degenerate probabilities",
            assignments.degenerate_rows,
            prototypes.len()
        );
    }
    debug!(
        "Propagated {} identities into {run} from {} prototypes over {} features",
        assignments.identities.len(),
        prototypes.len(),
        queries.len()
    );
    Ok(RunPropagation {
        run: run.to_string(),
        identities: assignments.identities,
        prototypes: prototypes.len(),
        degenerate_rows: assignments.degenerate_rows,
    })
}

/// Diagnostic counts accumulated over a propagation pass
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PropagationSummary {
    pub runs_processed: usize,
    pub runs_without_features: usize,
    pub runs_insufficient_candidates: usize,
    pub prototypes: usize,
    pub degenerate_rows: usize,
    pub propagated: usize,
    pub low_confidence: usize,
}

impl PropagationSummary {
    pub fn runs_skipped(&self) -> usize {
        self.runs_without_features + self.runs_insufficient_candidates
    }

    fn from_outcome(outcome: &Result<RunPropagation, PropagationError>) -> Self {
        match outcome {
            Ok(prop) => Self {
                runs_processed: 1,
                prototypes: prop.prototypes,
                degenerate_rows: prop.degenerate_rows,
                propagated: prop.identities.len(),
                ..Default::default()
            },
            Err(PropagationError::NoAvailableFeatures { .. }) => Self {
                runs_without_features: 1,
                ..Default::default()
            },
            Err(PropagationError::InsufficientCandidates { .. }) => Self {
                runs_insufficient_candidates: 1,
                ..Default::default()
            },
        }
    }
}

impl Add for PropagationSummary {
    type Output = PropagationSummary;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for PropagationSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.runs_processed += rhs.runs_processed;
        self.runs_without_features += rhs.runs_without_features;
        self.runs_insufficient_candidates += rhs.runs_insufficient_candidates;
        self.prototypes += rhs.prototypes;
        self.degenerate_rows += rhs.degenerate_rows;
        self.propagated += rhs.propagated;
        self.low_confidence += rhs.low_confidence;
    }
}

/// The merged result of propagating over every run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PropagationResult {
    /// Propagated identities, grouped by run in sorted run order
    pub identities: Vec<PropagatedIdentity>,
    pub summary: PropagationSummary,
}

/// Runs [`propagate`] over every run of a [`FeatureTables`]
#[derive(Debug, Clone)]
pub struct PropagationEngine<'a> {
    tables: &'a FeatureTables,
    params: PropagationParams,
    groups: RunGroups,
}

impl<'a> PropagationEngine<'a> {
    pub fn new(tables: &'a FeatureTables, params: PropagationParams) -> Self {
        Self {
            tables,
            params,
            groups: RunGroups::default(),
        }
    }

    pub fn with_groups(mut self, groups: RunGroups) -> Self {
        self.groups = groups;
        self
    }

    pub fn params(&self) -> &PropagationParams {
        &self.params
    }

    pub fn propagate_run(&self, run: &str) -> Result<RunPropagation, PropagationError> {
        propagate(run, self.tables, &self.params, &self.groups)
    }

    /// Propagate into every run in parallel, merging in sorted run order.
    pub fn propagate_all(&self) -> PropagationResult {
        let runs = self.tables.runs();
        let ungrouped = runs.iter().filter(|r| !self.groups.is_grouped(r)).count();
        if ungrouped > 0 {
            warn!("{ungrouped} runs are not assigned to a group and will not receive identities");
        }

        let outcomes: Vec<Result<RunPropagation, PropagationError>> = runs
            .par_iter()
            .map(|run| self.propagate_run(run))
            .collect();

        let mut result = PropagationResult::default();
        for outcome in outcomes {
            result.summary += PropagationSummary::from_outcome(&outcome);
            match outcome {
                Ok(prop) => result.identities.extend(prop.identities),
                Err(e @ PropagationError::InsufficientCandidates { .. }) => {
                    warn!("Skipping: {e}")
                }
                Err(e @ PropagationError::NoAvailableFeatures { .. }) => {
                    debug!("Skipping: {e}")
                }
            }
        }
        result
    }
}
