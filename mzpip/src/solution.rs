use std::fmt::Display;

use ndarray::ArrayView1;

use crate::feature::{Identification, PeptideFeature, SpeciesKey};
use crate::neighbors::NeighborTable;
use crate::scorer::{ProbabilityMatrix, ScoreType};

/// An identity transferred onto an unidentified feature
#[derive(Debug, Clone, PartialEq)]
pub struct PropagatedIdentity {
    /// The run the unidentified feature was detected in
    pub run: String,
    /// The species of the prototype identification
    pub species: SpeciesKey,
    /// The intensity of the unidentified feature
    pub intensity: f64,
    pub probability: ScoreType,
    /// The run the prototype identification was made in
    pub source_run: String,
}

impl PropagatedIdentity {
    pub fn new(
        run: String,
        species: SpeciesKey,
        intensity: f64,
        probability: ScoreType,
        source_run: String,
    ) -> Self {
        Self {
            run,
            species,
            intensity,
            probability,
            source_run,
        }
    }
}

impl Display for PropagatedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{} <- {} ({:0.3}, p={:0.4})",
            self.species, self.run, self.source_run, self.intensity, self.probability
        )
    }
}

/// The outcome of choosing among one prototype's candidates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowSelection {
    /// The position of the winning candidate within the row and its probability
    Selected(usize, ScoreType),
    /// Too few finite probabilities, or no candidate with a positive probability
    Degenerate,
}

/// Pick the most probable candidate of a row.
///
/// A row needs at least two finite entries, or one when the row only has one candidate.
/// Among equal maxima the earliest candidate wins.
pub fn select_candidate(row: ArrayView1<'_, ScoreType>) -> RowSelection {
    let required = row.len().min(2);
    let finite = row.iter().filter(|p| p.is_finite()).count();
    if row.is_empty() || finite < required {
        return RowSelection::Degenerate;
    }
    let mut best: Option<(usize, ScoreType)> = None;
    for (i, p) in row.iter().copied().enumerate() {
        if !p.is_finite() {
            continue;
        }
        match best {
            Some((_, q)) if p <= q => {}
            _ => best = Some((i, p)),
        }
    }
    match best {
        Some((i, p)) if p > 0.0 => RowSelection::Selected(i, p),
        _ => RowSelection::Degenerate,
    }
}

/// The propagated identities of a run together with the number of rows dropped
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Assignments {
    pub identities: Vec<PropagatedIdentity>,
    pub degenerate_rows: usize,
}

/// Emit one [`PropagatedIdentity`] for each prototype row with a usable winner.
///
/// `prototypes` are indexed like the rows of `table` and `probabilities`, `queries` like the
/// query indices `table` refers to.
pub fn select_assignments(
    prototypes: &[&Identification],
    queries: &[&PeptideFeature],
    table: &NeighborTable,
    probabilities: &ProbabilityMatrix,
) -> Assignments {
    let mut acc = Assignments::default();
    for (row_idx, (proto, probs)) in prototypes.iter().zip(probabilities.rows()).enumerate() {
        match select_candidate(probs) {
            RowSelection::Selected(position, probability) => {
                let query = queries[table.row(row_idx).indices[position]];
                // Unidentified features are only built from detections with an intensity
                let Some(intensity) = query.intensity else {
                    acc.degenerate_rows += 1;
                    continue;
                };
                acc.identities.push(PropagatedIdentity::new(
                    query.run.clone(),
                    proto.species.clone(),
                    intensity,
                    probability,
                    proto.run().to_string(),
                ));
            }
            RowSelection::Degenerate => {
                acc.degenerate_rows += 1;
            }
        }
    }
    acc
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::aview1;

    #[test]
    fn test_first_occurrence_tie_break() {
        assert_eq!(
            select_candidate(aview1(&[0.25, 0.375, 0.375])),
            RowSelection::Selected(1, 0.375)
        );
        assert_eq!(
            select_candidate(aview1(&[0.5, 0.5, 0.0])),
            RowSelection::Selected(0, 0.5)
        );
    }

    #[test]
    fn test_degenerate_rows() {
        assert_eq!(select_candidate(aview1::<f64>(&[])), RowSelection::Degenerate);
        assert_eq!(
            select_candidate(aview1(&[f64::NAN, f64::NAN])),
            RowSelection::Degenerate
        );
        assert_eq!(
            select_candidate(aview1(&[1.0, f64::NAN, f64::NAN])),
            RowSelection::Degenerate
        );
        assert_eq!(select_candidate(aview1(&[0.0, 0.0])), RowSelection::Degenerate);
        assert_eq!(select_candidate(aview1(&[f64::NAN])), RowSelection::Degenerate);
        assert_eq!(select_candidate(aview1(&[1.0])), RowSelection::Selected(0, 1.0));
    }
}
