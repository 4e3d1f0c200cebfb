//! The feature data model shared by the identification and detection tables
use std::fmt::Display;
use std::hash::Hash;

/// The number of attributes a feature is embedded with for neighbor search
pub const EMBEDDING_SIZE: usize = 5;

/// A point in the (retention time, charge, m/z, mass, shape) coordinate space
pub type FeatureEmbedding = [f64; EMBEDDING_SIZE];

/// Which instrument-dependent column describes the shape of a feature.
///
/// This is resolved once, when the tables are read, so that nothing downstream
/// has to know which acquisition mode produced the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeAttribute {
    /// The number of isotopic peaks assembled into the feature
    #[default]
    IsotopicPeakCount,
    /// The ion mobility index of the feature apex, for ion mobility enabled acquisitions
    IonMobilityIndex,
}

impl ShapeAttribute {
    pub const fn column_name(&self) -> &'static str {
        match self {
            ShapeAttribute::IsotopicPeakCount => "Number of isotopic peaks",
            ShapeAttribute::IonMobilityIndex => "Ion mobility index",
        }
    }
}

impl Display for ShapeAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column_name())
    }
}

/// The resolved set of attributes used to read, anchor and embed features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeSet {
    pub shape: ShapeAttribute,
}

impl AttributeSet {
    pub fn new(shape: ShapeAttribute) -> Self {
        Self { shape }
    }

    /// Select the attribute set from the `tims_ms` switch
    pub fn from_tims_ms(tims_ms: bool) -> Self {
        if tims_ms {
            Self::new(ShapeAttribute::IonMobilityIndex)
        } else {
            Self::new(ShapeAttribute::IsotopicPeakCount)
        }
    }
}

/// The peptide species identity, the modified sequence concatenated with the charge state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpeciesKey(String);

impl SpeciesKey {
    pub fn new(modified_sequence: &str, charge: i32) -> Self {
        Self(format!("{modified_sequence}{charge}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SpeciesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SpeciesKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single MS1 feature from either table
#[derive(Debug, Clone, PartialEq)]
pub struct PeptideFeature {
    pub run: String,
    pub charge: i32,
    pub intensity: Option<f64>,
    pub retention_time: f64,
    pub mz: f64,
    pub mass: f64,
    /// The value of the configured [`ShapeAttribute`]
    pub shape: f64,
}

impl PeptideFeature {
    pub fn new(
        run: String,
        charge: i32,
        intensity: Option<f64>,
        retention_time: f64,
        mz: f64,
        mass: f64,
        shape: f64,
    ) -> Self {
        Self {
            run,
            charge,
            intensity,
            retention_time,
            mz,
            mass,
            shape,
        }
    }

    /// The coordinates used for neighbor search. Intensity is deliberately absent,
    /// it is the quantity being recovered.
    #[inline]
    pub fn embedding(&self) -> FeatureEmbedding {
        [
            self.retention_time,
            self.charge as f64,
            self.mz,
            self.mass,
            self.shape,
        ]
    }

    pub fn anchor_key(&self) -> AnchorKey<'_> {
        AnchorKey::new(&self.run, self.charge, self.intensity, self.shape)
    }
}

/// A row of the identification table
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub modified_sequence: String,
    pub species: SpeciesKey,
    pub feature: PeptideFeature,
}

impl Identification {
    pub fn new(modified_sequence: String, feature: PeptideFeature) -> Self {
        let species = SpeciesKey::new(&modified_sequence, feature.charge);
        Self {
            modified_sequence,
            species,
            feature,
        }
    }

    pub fn run(&self) -> &str {
        &self.feature.run
    }

    pub fn charge(&self) -> i32 {
        self.feature.charge
    }
}

/// The attributes used to equate an identification with the detection event it came from.
///
/// Floating point values are compared bit-for-bit, the tables are expected to carry the
/// same serialized value for the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorKey<'a> {
    pub run: &'a str,
    pub charge: i32,
    intensity: Option<u64>,
    shape: u64,
}

impl<'a> AnchorKey<'a> {
    pub fn new(run: &'a str, charge: i32, intensity: Option<f64>, shape: f64) -> Self {
        Self {
            run,
            charge,
            intensity: intensity.map(canonical_bits),
            shape: canonical_bits(shape),
        }
    }
}

#[inline]
fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_species_key() {
        let key = SpeciesKey::new("_PEPTIDEK_", 2);
        assert_eq!(key.as_str(), "_PEPTIDEK_2");
        assert_ne!(key, SpeciesKey::new("_PEPTIDEK_", 3));
    }

    #[test]
    fn test_anchor_equality() {
        let a = PeptideFeature::new("A".into(), 2, Some(100.0), 10.0, 500.0, 998.0, 3.0);
        let mut b = a.clone();
        b.retention_time = 12.0;
        b.mz = 501.0;
        assert_eq!(a.anchor_key(), b.anchor_key());
        b.intensity = Some(101.0);
        assert_ne!(a.anchor_key(), b.anchor_key());
        let c = PeptideFeature::new("A".into(), 2, Some(100.0), 10.0, 500.0, 998.0, -0.0);
        let d = PeptideFeature::new("A".into(), 2, Some(100.0), 10.0, 500.0, 998.0, 0.0);
        assert_eq!(c.anchor_key(), d.anchor_key());
    }

    #[test]
    fn test_embedding_excludes_intensity() {
        let a = PeptideFeature::new("A".into(), 2, Some(100.0), 10.0, 500.0, 998.0, 3.0);
        let mut b = a.clone();
        b.intensity = Some(5.0);
        assert_eq!(a.embedding(), b.embedding());
        assert_eq!(a.embedding(), [10.0, 2.0, 500.0, 998.0, 3.0]);
    }

    #[test]
    fn test_attribute_set() {
        assert_eq!(
            AttributeSet::from_tims_ms(true).shape,
            ShapeAttribute::IonMobilityIndex
        );
        assert_eq!(AttributeSet::default(), AttributeSet::from_tims_ms(false));
        assert_eq!(
            ShapeAttribute::IsotopicPeakCount.column_name(),
            "Number of isotopic peaks"
        );
    }
}
