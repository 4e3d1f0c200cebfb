//! Turn neighbor distances into propagation probabilities
use ndarray::{Array2, ArrayView1, ArrayViewMut1, Axis};

use crate::neighbors::{NeighborRow, NeighborTable};

pub type ScoreType = f64;

/// How a row of charge-masked kernel scores is normalized.
///
/// Only [`ScoreNormalization::MaskedSum`] yields a probability distribution over a
/// prototype's candidates, and it is what the propagation pipeline uses. The other two
/// are kept for inspecting the scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreNormalization {
    /// Divide each masked score by the row sum of the masked scores
    #[default]
    MaskedSum,
    /// Divide each masked score by the row sum of the unmasked kernel scores
    UnmaskedSum,
    /// Leave the masked kernel scores as they are
    Raw,
}

/// The median of a prototype's neighbor distances, the mean of the two middle values
/// when there is an even number of them.
pub fn adaptive_bandwidth<'a, I: IntoIterator<Item = &'a f64>>(distances: I) -> f64 {
    let mut sorted: Vec<f64> = distances.into_iter().copied().collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// A Gaussian kernel with an adaptive width
///
/// ```math
/// s(d) = \exp\left(-\frac{1}{2} \frac{d^2}{\sigma}\right)
/// ```
///
/// where $`\sigma`$ is the [`adaptive_bandwidth`] of the row. A zero bandwidth gives
/// a non-finite score for a zero distance.
#[inline]
pub fn gaussian_kernel(distance: f64, bandwidth: f64) -> ScoreType {
    (-0.5 * distance.powi(2) / bandwidth).exp()
}

/// A dense prototype × k table of candidate probabilities
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProbabilityMatrix {
    values: Array2<ScoreType>,
}

impl ProbabilityMatrix {
    pub fn k(&self) -> usize {
        self.values.ncols()
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, ScoreType> {
        self.values.row(i)
    }

    pub fn rows(&self) -> impl Iterator<Item = ArrayView1<'_, ScoreType>> + '_ {
        self.values.rows().into_iter()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer {
    pub normalization: ScoreNormalization,
}

impl ConfidenceScorer {
    pub fn new(normalization: ScoreNormalization) -> Self {
        Self { normalization }
    }

    /// Score one prototype's candidates into `out`, which must be as long as `row`.
    ///
    /// `candidate_charges` yields the charge of each candidate in row order.
    pub fn score_row<I: IntoIterator<Item = i32>>(
        &self,
        row: NeighborRow<'_>,
        prototype_charge: i32,
        candidate_charges: I,
        mut out: ArrayViewMut1<'_, ScoreType>,
    ) {
        let bandwidth = adaptive_bandwidth(row.distances);
        let mut unmasked_total = 0.0;
        let mut masked_total = 0.0;
        for ((distance, charge), cell) in row
            .distances
            .iter()
            .zip(candidate_charges)
            .zip(out.iter_mut())
        {
            let score = gaussian_kernel(*distance, bandwidth);
            let mask = if charge == prototype_charge { 1.0 } else { 0.0 };
            let masked = mask * score;
            unmasked_total += score;
            masked_total += masked;
            *cell = masked;
        }
        let denominator = match self.normalization {
            ScoreNormalization::MaskedSum => masked_total,
            ScoreNormalization::UnmaskedSum => unmasked_total,
            ScoreNormalization::Raw => return,
        };
        out /= denominator;
    }

    /// Score every row of a neighbor table.
    ///
    /// `prototype_charges` is indexed by row, `query_charges` by the query indices the
    /// table refers to.
    pub fn score(
        &self,
        table: &NeighborTable,
        prototype_charges: &[i32],
        query_charges: &[i32],
    ) -> ProbabilityMatrix {
        let mut values = Array2::zeros((table.len(), table.k()));
        for ((row, prototype_charge), out) in table
            .rows()
            .zip(prototype_charges.iter().copied())
            .zip(values.axis_iter_mut(Axis(0)))
        {
            self.score_row(
                row,
                prototype_charge,
                row.indices.iter().map(|i| query_charges[*i]),
                out,
            );
        }
        ProbabilityMatrix { values }
    }
}
