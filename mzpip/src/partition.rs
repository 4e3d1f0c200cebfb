//! Split the global tables into the per-run propagation problem
use std::collections::{HashMap, HashSet};

use crate::feature::{Identification, PeptideFeature, SpeciesKey};
use crate::tables::FeatureTables;

/// An optional restriction of which runs may lend identities to one another.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum RunGroups {
    /// Every run may draw prototypes from every other run
    #[default]
    Unrestricted,
    /// Runs only draw prototypes from runs in the same group. Runs without
    /// a group draw from nowhere.
    Restricted(HashMap<String, String>),
}

impl RunGroups {
    pub fn restricted(groups: HashMap<String, String>) -> Self {
        Self::Restricted(groups)
    }

    pub fn group_of(&self, run: &str) -> Option<&str> {
        match self {
            RunGroups::Unrestricted => None,
            RunGroups::Restricted(groups) => groups.get(run).map(|s| s.as_str()),
        }
    }

    pub fn is_grouped(&self, run: &str) -> bool {
        match self {
            RunGroups::Unrestricted => true,
            RunGroups::Restricted(groups) => groups.contains_key(run),
        }
    }

    /// Whether `query_run` may receive identities from `source_run`
    pub fn shares_group(&self, query_run: &str, source_run: &str) -> bool {
        match self {
            RunGroups::Unrestricted => true,
            RunGroups::Restricted(groups) => match (groups.get(query_run), groups.get(source_run)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// The propagation problem for a single run
#[derive(Debug, Clone)]
pub struct RunPartition<'a> {
    pub run: &'a str,
    /// Species identified in some other run but not in this one
    pub missing_idents: HashSet<&'a SpeciesKey>,
    /// This run's detected but unidentified features
    pub query_features: Vec<&'a PeptideFeature>,
}

impl<'a> RunPartition<'a> {
    pub fn new(tables: &'a FeatureTables, run: &'a str, groups: &RunGroups) -> Self {
        let local = tables.species_in_run(run);
        let mut missing_idents = HashSet::new();
        for (source_run, species) in tables.species_by_run() {
            if source_run == run || !groups.shares_group(run, source_run) {
                continue;
            }
            missing_idents.extend(
                species
                    .iter()
                    .filter(|key| !local.is_some_and(|local| local.contains(*key))),
            );
        }
        let query_features = tables.unidentified_in_run(run);
        Self {
            run,
            missing_idents,
            query_features,
        }
    }

    /// Whether there is anything to propagate in this run
    pub fn is_empty(&self) -> bool {
        self.missing_idents.is_empty() || self.query_features.is_empty()
    }

    /// The identified features from other runs carrying a missing species, in table order.
    pub fn prototypes(
        &self,
        tables: &'a FeatureTables,
        groups: &RunGroups,
    ) -> Vec<&'a Identification> {
        tables
            .identified_features()
            .filter(|ident| {
                ident.run() != self.run
                    && groups.shares_group(self.run, ident.run())
                    && self.missing_idents.contains(&ident.species)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ident(run: &str, seq: &str, charge: i32, intensity: f64) -> Identification {
        Identification::new(
            seq.to_string(),
            PeptideFeature::new(run.to_string(), charge, Some(intensity), 10.0, 500.0, 998.0, 3.0),
        )
    }

    fn detection(run: &str, charge: i32, intensity: f64) -> PeptideFeature {
        PeptideFeature::new(run.to_string(), charge, Some(intensity), 10.1, 500.2, 998.1, 3.0)
    }

    fn make_tables() -> FeatureTables {
        let idents = vec![
            ident("A", "_P_", 2, 100.0),
            ident("A", "_Q_", 2, 50.0),
            ident("B", "_Q_", 2, 60.0),
            ident("C", "_R_", 3, 70.0),
        ];
        let dets = vec![
            detection("A", 2, 100.0),
            detection("A", 2, 50.0),
            detection("B", 2, 60.0),
            detection("C", 3, 70.0),
            detection("B", 2, 90.0),
            detection("B", 3, 80.0),
        ];
        FeatureTables::new(idents, dets)
    }

    #[test]
    fn test_partition() {
        let tables = make_tables();
        let groups = RunGroups::default();
        let part = RunPartition::new(&tables, "B", &groups);
        let mut missing: Vec<_> = part.missing_idents.iter().map(|k| k.as_str()).collect();
        missing.sort();
        assert_eq!(missing, ["_P_2", "_R_3"]);
        assert_eq!(part.query_features.len(), 2);

        let protos = part.prototypes(&tables, &groups);
        assert_eq!(protos.len(), 2);
        assert!(protos.iter().all(|p| p.run() != "B"));

        let part = RunPartition::new(&tables, "A", &groups);
        assert!(part.query_features.is_empty());
        assert!(part.is_empty());
    }

    #[test]
    fn test_partition_restricted() {
        let tables = make_tables();
        let groups = RunGroups::restricted(
            [("A", "x"), ("B", "x"), ("C", "y")]
                .into_iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        );
        let part = RunPartition::new(&tables, "B", &groups);
        let missing: Vec<_> = part.missing_idents.iter().map(|k| k.as_str()).collect();
        assert_eq!(missing, ["_P_2"]);
        let protos = part.prototypes(&tables, &groups);
        assert_eq!(protos.len(), 1);
        assert_eq!(protos[0].run(), "A");
        assert!(!groups.is_grouped("D"));
        assert_eq!(groups.group_of("C"), Some("y"));
    }
}
