//! Reconcile the identification and detection tables into identified and unidentified features
use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::feature::{AnchorKey, Identification, PeptideFeature, SpeciesKey};

/// Counts of rows set aside while building [`FeatureTables`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub identifications: usize,
    pub detections: usize,
    pub identifications_without_intensity: usize,
    pub detections_without_intensity: usize,
    pub identified_features: usize,
    pub unidentified_features: usize,
}

/// The reconciled input tables.
///
/// Identified features are identifications whose anchor attributes match a detection exactly.
/// Unidentified features are detections that no identification anchors to.
#[derive(Debug, Default, Clone)]
pub struct FeatureTables {
    identifications: Vec<Identification>,
    detections: Vec<PeptideFeature>,
    identified: Vec<usize>,
    unidentified: Vec<usize>,
    runs: Vec<String>,
    species_by_run: HashMap<String, HashSet<SpeciesKey>>,
    unidentified_by_run: HashMap<String, Vec<usize>>,
    counts: TableCounts,
}

impl FeatureTables {
    pub fn new(identifications: Vec<Identification>, detections: Vec<PeptideFeature>) -> Self {
        let mut counts = TableCounts {
            identifications: identifications.len(),
            detections: detections.len(),
            ..Default::default()
        };

        let identifications: Vec<Identification> = identifications
            .into_iter()
            .filter(|ident| ident.feature.intensity.is_some())
            .collect();
        counts.identifications_without_intensity =
            counts.identifications - identifications.len();

        let detections: Vec<PeptideFeature> = detections
            .into_iter()
            .filter(|feat| feat.intensity.is_some())
            .collect();
        counts.detections_without_intensity = counts.detections - detections.len();

        let (identified, unidentified) = {
            let detection_anchors: HashSet<AnchorKey<'_>> =
                detections.iter().map(|feat| feat.anchor_key()).collect();
            let identification_anchors: HashSet<AnchorKey<'_>> = identifications
                .iter()
                .map(|ident| ident.feature.anchor_key())
                .collect();

            let identified: Vec<usize> = identifications
                .iter()
                .enumerate()
                .filter(|(_, ident)| detection_anchors.contains(&ident.feature.anchor_key()))
                .map(|(i, _)| i)
                .collect();

            let unidentified: Vec<usize> = detections
                .iter()
                .enumerate()
                .filter(|(_, feat)| !identification_anchors.contains(&feat.anchor_key()))
                .map(|(i, _)| i)
                .collect();
            (identified, unidentified)
        };

        counts.identified_features = identified.len();
        counts.unidentified_features = unidentified.len();

        let mut species_by_run: HashMap<String, HashSet<SpeciesKey>> = HashMap::new();
        for ident in identifications.iter() {
            species_by_run
                .entry(ident.run().to_string())
                .or_default()
                .insert(ident.species.clone());
        }

        let mut unidentified_by_run: HashMap<String, Vec<usize>> = HashMap::new();
        for i in unidentified.iter().copied() {
            unidentified_by_run
                .entry(detections[i].run.clone())
                .or_default()
                .push(i);
        }

        let runs: BTreeSet<&str> = identifications
            .iter()
            .map(|ident| ident.run())
            .chain(detections.iter().map(|feat| feat.run.as_str()))
            .collect();
        let runs: Vec<String> = runs.into_iter().map(|s| s.to_string()).collect();

        debug!(
            "Reconciled {} identifications and {} detections into {} identified and {} unidentified features",
            identifications.len(),
            detections.len(),
            counts.identified_features,
            counts.unidentified_features
        );

        Self {
            identifications,
            detections,
            identified,
            unidentified,
            runs,
            species_by_run,
            unidentified_by_run,
            counts,
        }
    }

    /// Every identification with a present intensity
    pub fn identifications(&self) -> &[Identification] {
        &self.identifications
    }

    /// Every detection with a present intensity
    pub fn detections(&self) -> &[PeptideFeature] {
        &self.detections
    }

    pub fn identified_features(&self) -> impl Iterator<Item = &Identification> + '_ {
        self.identified.iter().map(|i| &self.identifications[*i])
    }

    pub fn unidentified_features(&self) -> impl Iterator<Item = &PeptideFeature> + '_ {
        self.unidentified.iter().map(|i| &self.detections[*i])
    }

    /// The unidentified features of `run`, in table order
    pub fn unidentified_in_run(&self, run: &str) -> Vec<&PeptideFeature> {
        self.unidentified_by_run
            .get(run)
            .map(|idxs| idxs.iter().map(|i| &self.detections[*i]).collect())
            .unwrap_or_default()
    }

    /// The species identified in `run`, if any identification was made there
    pub fn species_in_run(&self, run: &str) -> Option<&HashSet<SpeciesKey>> {
        self.species_by_run.get(run)
    }

    pub(crate) fn species_by_run(&self) -> impl Iterator<Item = (&str, &HashSet<SpeciesKey>)> + '_ {
        self.species_by_run.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The sorted union of run identifiers from both tables
    pub fn runs(&self) -> &[String] {
        &self.runs
    }

    pub fn counts(&self) -> TableCounts {
        self.counts
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn feature(run: &str, charge: i32, intensity: Option<f64>, rt: f64) -> PeptideFeature {
        PeptideFeature::new(run.to_string(), charge, intensity, rt, 500.0, 998.0, 3.0)
    }

    #[test]
    fn test_anchor_join() {
        let idents = vec![
            Identification::new("_PEPTIDE_".into(), feature("A", 2, Some(100.0), 10.0)),
            Identification::new("_OTHER_".into(), feature("A", 2, Some(50.0), 20.0)),
            Identification::new("_MISSING_".into(), feature("B", 2, None, 20.0)),
        ];
        let dets = vec![
            feature("A", 2, Some(100.0), 10.01),
            feature("B", 2, Some(90.0), 10.1),
            feature("B", 3, Some(70.0), 10.1),
            feature("B", 3, None, 10.1),
        ];
        let tables = FeatureTables::new(idents, dets);
        let counts = tables.counts();
        assert_eq!(counts.identifications_without_intensity, 1);
        assert_eq!(counts.detections_without_intensity, 1);
        assert_eq!(counts.identified_features, 1);
        assert_eq!(counts.unidentified_features, 2);

        let identified: Vec<_> = tables.identified_features().collect();
        assert_eq!(identified[0].species.as_str(), "_PEPTIDE_2");

        assert!(tables.unidentified_in_run("A").is_empty());
        let b = tables.unidentified_in_run("B");
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].intensity, Some(90.0));
        assert_eq!(tables.runs(), &["A".to_string(), "B".to_string()]);
        assert!(tables.species_in_run("B").is_none());
    }
}
