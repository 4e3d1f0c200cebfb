//! Peptide identity propagation between label-free mass spectrometry runs.
//!
//! Peptides identified by MS/MS in some runs are often detected, but not fragmented, in
//! others. For every run, [`propagate`] matches the identifications missing from that run
//! against its unidentified MS1 features, scores each candidate with a charge-masked,
//! locally scaled Gaussian kernel, and transfers each identification onto its most
//! probable candidate. [`aggregate::aggregate`] then merges the transfers with the
//! original identifications into one intensity table.
pub mod feature;
pub mod io;
pub mod tables;
pub mod partition;
pub mod neighbors;
pub mod scorer;
pub mod solution;
pub mod api;
pub mod aggregate;

pub use api::{
    propagate, PropagationEngine, PropagationError, PropagationParams, PropagationResult,
    PropagationSummary,
};
pub use feature::{AttributeSet, Identification, PeptideFeature, ShapeAttribute, SpeciesKey};
pub use partition::RunGroups;
pub use solution::PropagatedIdentity;
pub use tables::FeatureTables;
