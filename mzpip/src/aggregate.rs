//! Filter propagated identities by confidence and merge them with the original identifications
use std::collections::HashMap;
use std::fmt::Display;

use itertools::Itertools;
use ndarray::{Array2, ArrayView1};
use tracing::debug;

use crate::api::{PropagationResult, PropagationSummary};
use crate::feature::SpeciesKey;
use crate::scorer::ScoreType;
use crate::solution::PropagatedIdentity;
use crate::tables::FeatureTables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordOrigin {
    Identified,
    Propagated,
}

impl Display for RecordOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One row of the combined intensity table
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityRecord {
    pub run: String,
    pub species: SpeciesKey,
    pub intensity: f64,
    pub origin: RecordOrigin,
    /// Present only when observation weights were requested
    pub weight: Option<ScoreType>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationParams {
    /// Propagated identities with a probability at or below this value are discarded
    pub thresh: ScoreType,
    pub skip_weights: bool,
}

impl AggregationParams {
    pub fn new(thresh: ScoreType, skip_weights: bool) -> Self {
        Self {
            thresh,
            skip_weights,
        }
    }
}

impl Default for AggregationParams {
    fn default() -> Self {
        Self {
            thresh: 0.0,
            skip_weights: true,
        }
    }
}

/// Split propagated identities into those above `thresh` and the number at or below it
pub fn filter_by_confidence(
    identities: Vec<PropagatedIdentity>,
    thresh: ScoreType,
) -> (Vec<PropagatedIdentity>, usize) {
    let total = identities.len();
    let kept: Vec<PropagatedIdentity> = identities
        .into_iter()
        .filter(|ident| ident.probability > thresh)
        .collect();
    let discarded = total - kept.len();
    (kept, discarded)
}

/// The identified and propagated intensities of every run, grouped by run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CombinedTable {
    pub records: Vec<IntensityRecord>,
    pub weighted: bool,
}

impl CombinedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IntensityRecord> {
        self.records.iter()
    }

    pub fn count_origin(&self, origin: RecordOrigin) -> usize {
        self.records.iter().filter(|r| r.origin == origin).count()
    }

    /// Merge `propagated` with every identification carrying an intensity.
    ///
    /// Weights are 1 for identifications and the propagation probability otherwise.
    pub fn merge(tables: &FeatureTables, propagated: Vec<PropagatedIdentity>, weighted: bool) -> Self {
        let identified_weight = if weighted { Some(1.0) } else { None };
        let mut records: Vec<IntensityRecord> = tables
            .identifications()
            .iter()
            .filter_map(|ident| {
                ident.feature.intensity.map(|intensity| IntensityRecord {
                    run: ident.run().to_string(),
                    species: ident.species.clone(),
                    intensity,
                    origin: RecordOrigin::Identified,
                    weight: identified_weight,
                })
            })
            .collect();
        records.extend(propagated.into_iter().map(|ident| IntensityRecord {
            weight: weighted.then_some(ident.probability),
            run: ident.run,
            species: ident.species,
            intensity: ident.intensity,
            origin: RecordOrigin::Propagated,
        }));
        // Stable, so identifications stay ahead of propagated records within a run
        records.sort_by(|a, b| a.run.cmp(&b.run));
        Self { records, weighted }
    }

    /// Pivot into a species × run matrix
    pub fn to_matrix(&self) -> IntensityMatrix {
        IntensityMatrix::from_records(&self.records)
    }
}

/// Filter a propagation pass by confidence and merge it with the identifications.
///
/// The returned summary is `result.summary` with the low confidence discards added.
pub fn aggregate(
    tables: &FeatureTables,
    result: PropagationResult,
    params: &AggregationParams,
) -> (CombinedTable, PropagationSummary) {
    let PropagationResult {
        identities,
        mut summary,
    } = result;
    let (kept, discarded) = filter_by_confidence(identities, params.thresh);
    summary.low_confidence += discarded;
    debug!(
        "Retained {} propagated identities, discarded {} at or below {}",
        kept.len(),
        discarded,
        params.thresh
    );
    let table = CombinedTable::merge(tables, kept, !params.skip_weights);
    (table, summary)
}

/// A dense species × run intensity matrix with absent cells left empty.
///
/// When a species appears more than once in a run, the largest intensity is kept.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IntensityMatrix {
    pub species: Vec<SpeciesKey>,
    pub runs: Vec<String>,
    values: Array2<Option<f64>>,
}

impl IntensityMatrix {
    pub fn from_records(records: &[IntensityRecord]) -> Self {
        let runs: Vec<String> = records
            .iter()
            .map(|r| r.run.as_str())
            .unique()
            .sorted()
            .map(|s| s.to_string())
            .collect();
        let species: Vec<SpeciesKey> = records
            .iter()
            .map(|r| &r.species)
            .unique()
            .sorted()
            .cloned()
            .collect();
        let run_index: HashMap<&str, usize> = runs
            .iter()
            .enumerate()
            .map(|(i, r)| (r.as_str(), i))
            .collect();
        let species_index: HashMap<&SpeciesKey, usize> =
            species.iter().enumerate().map(|(i, k)| (k, i)).collect();

        let mut values = Array2::from_elem((species.len(), runs.len()), None);
        for rec in records {
            let cell = &mut values[[species_index[&rec.species], run_index[rec.run.as_str()]]];
            if cell.map_or(true, |current| rec.intensity > current) {
                *cell = Some(rec.intensity);
            }
        }

        Self {
            species,
            runs,
            values,
        }
    }

    pub fn get(&self, species: usize, run: usize) -> Option<f64> {
        self.values[[species, run]]
    }

    pub fn row(&self, species: usize) -> ArrayView1<'_, Option<f64>> {
        self.values.row(species)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&SpeciesKey, ArrayView1<'_, Option<f64>>)> + '_ {
        self.species.iter().zip(self.values.rows())
    }
}
