//! Exact k-nearest-neighbor search from prototypes into a run's query features
use std::cmp::Ordering;

use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use thiserror::Error;

use crate::feature::FeatureEmbedding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{available} candidate features are fewer than the {k} neighbors requested")]
pub struct InsufficientCandidates {
    pub available: usize,
    pub k: usize,
}

#[inline]
pub fn euclidean_distance(a: &FeatureEmbedding, b: &FeatureEmbedding) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Distances sort ascending, equal distances fall back to the lower query index
#[inline]
fn neighbor_order(a: &(f64, usize), b: &(f64, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1))
}

/// One prototype's neighbors, nearest first
#[derive(Debug, Clone, Copy)]
pub struct NeighborRow<'a> {
    pub indices: ArrayView1<'a, usize>,
    pub distances: ArrayView1<'a, f64>,
}

impl<'a> NeighborRow<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + 'a {
        let NeighborRow { indices, distances } = *self;
        indices
            .into_iter()
            .copied()
            .zip(distances.into_iter().copied())
    }
}

/// A dense prototype × k table of query indices and their distances
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NeighborTable {
    indices: Array2<usize>,
    distances: Array2<f64>,
}

impl NeighborTable {
    pub fn k(&self) -> usize {
        self.indices.ncols()
    }

    /// The number of prototype rows
    pub fn len(&self) -> usize {
        self.indices.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn distances(&self) -> ArrayView2<'_, f64> {
        self.distances.view()
    }

    pub fn row(&self, i: usize) -> NeighborRow<'_> {
        NeighborRow {
            indices: self.indices.row(i),
            distances: self.distances.row(i),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = NeighborRow<'_>> + '_ {
        self.indices
            .rows()
            .into_iter()
            .zip(self.distances.rows())
            .map(|(indices, distances)| NeighborRow { indices, distances })
    }
}

/// Find the `k` nearest `queries` of every prototype.
///
/// The search runs from prototypes into the query set so every prototype gets exactly `k`
/// candidates. Fails when there are fewer than `k` queries rather than truncating.
pub fn find_nearest_neighbors(
    prototypes: &[FeatureEmbedding],
    queries: &[FeatureEmbedding],
    k: usize,
) -> Result<NeighborTable, InsufficientCandidates> {
    if queries.len() < k {
        return Err(InsufficientCandidates {
            available: queries.len(),
            k,
        });
    }
    if k == 0 {
        return Ok(NeighborTable::default());
    }

    let rows: Vec<Vec<(f64, usize)>> = prototypes
        .par_iter()
        .map(|proto| {
            let mut dists: Vec<(f64, usize)> = queries
                .iter()
                .enumerate()
                .map(|(i, q)| (euclidean_distance(proto, q), i))
                .collect();
            if dists.len() > k {
                dists.select_nth_unstable_by(k - 1, neighbor_order);
                dists.truncate(k);
            }
            dists.sort_by(neighbor_order);
            dists
        })
        .collect();

    let mut indices = Array2::<usize>::zeros((prototypes.len(), k));
    let mut distances = Array2::<f64>::zeros((prototypes.len(), k));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, (d, q)) in row.into_iter().enumerate() {
            distances[[i, j]] = d;
            indices[[i, j]] = q;
        }
    }
    Ok(NeighborTable { indices, distances })
}
