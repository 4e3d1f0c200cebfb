//! Discover and read the identification and detection tables.
//!
//! Both tables are tab-separated with a header row, using the column names MaxQuant
//! writes for `evidence.txt` and `allPeptides.txt` respectively. Tables may be gzip
//! compressed, indicated by a `.gz` extension.
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::feature::{AttributeSet, Identification, PeptideFeature};
use crate::partition::RunGroups;

pub const RAW_FILE_COLUMN: &str = "Raw file";
pub const MODIFIED_SEQUENCE_COLUMN: &str = "Modified sequence";
pub const CHARGE_COLUMN: &str = "Charge";
pub const INTENSITY_COLUMN: &str = "Intensity";
pub const RETENTION_TIME_COLUMN: &str = "Retention time";
pub const MZ_COLUMN: &str = "m/z";
pub const MASS_COLUMN: &str = "Mass";
pub const GROUP_COLUMN: &str = "Group";

const TABLE_EXTENSIONS: &[&str] = &["txt", "tsv"];

/// The two tables the propagation reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputTableKind {
    /// Peptide-spectrum matches with their MS1 feature attributes (`evidence.txt`)
    Identifications,
    /// Every MS1 feature detected, identified or not (`allPeptides.txt`)
    Detections,
    /// An optional run to experimental group mapping
    RunGroups,
}

impl InputTableKind {
    /// The case-insensitive file name prefix used to discover this table
    pub const fn file_prefix(&self) -> &'static str {
        match self {
            InputTableKind::Identifications => "evidence",
            InputTableKind::Detections => "allpeptides",
            InputTableKind::RunGroups => "groups",
        }
    }
}

impl Display for InputTableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputTableKind::Identifications => write!(f, "identification table (evidence)"),
            InputTableKind::Detections => write!(f, "detection table (allPeptides)"),
            InputTableKind::RunGroups => write!(f, "run group table"),
        }
    }
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to parse a table: {0}")]
    CSVError(
        #[source]
        #[from]
        csv::Error,
    ),
    #[error("The input path {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("Could not find the {kind} in {directory}")]
    MissingInputFile {
        kind: InputTableKind,
        directory: PathBuf,
    },
    #[error("The {table} is missing the required column \"{column}\"")]
    MissingColumn {
        table: InputTableKind,
        column: String,
    },
}

/// The resolved locations of the input tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFiles {
    pub identifications: PathBuf,
    pub detections: PathBuf,
}

impl InputFiles {
    pub fn new(identifications: PathBuf, detections: PathBuf) -> Self {
        Self {
            identifications,
            detections,
        }
    }

    /// Locate both tables in `directory` by file name prefix.
    ///
    /// When several files share a prefix, the lexicographically first is used.
    pub fn discover<P: AsRef<Path>>(directory: P) -> Result<Self, InputError> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(InputError::NotADirectory(directory.to_path_buf()));
        }
        let mut entries: Vec<PathBuf> = fs::read_dir(directory)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        entries.sort();

        let find = |kind: InputTableKind| -> Result<PathBuf, InputError> {
            entries
                .iter()
                .find(|path| is_table_for(path, kind))
                .cloned()
                .ok_or_else(|| InputError::MissingInputFile {
                    kind,
                    directory: directory.to_path_buf(),
                })
        };

        let identifications = find(InputTableKind::Identifications)?;
        let detections = find(InputTableKind::Detections)?;
        debug!(
            "Discovered {} and {}",
            identifications.display(),
            detections.display()
        );
        Ok(Self::new(identifications, detections))
    }

    pub fn read(
        &self,
        attributes: &AttributeSet,
    ) -> Result<(Vec<Identification>, Vec<PeptideFeature>), InputError> {
        let identifications = read_identifications(&self.identifications, attributes)?;
        let detections = read_detections(&self.detections, attributes)?;
        Ok((identifications, detections))
    }
}

fn is_table_for(path: &Path, kind: InputTableKind) -> bool {
    let Some(name) = path.file_name().map(|s| s.to_string_lossy().to_lowercase()) else {
        return false;
    };
    if !name.starts_with(kind.file_prefix()) {
        return false;
    }
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    TABLE_EXTENSIONS
        .iter()
        .any(|ext| name.rsplit_once('.').is_some_and(|(_, e)| e == *ext))
}

fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Open a table for reading, decompressing it if it has a `.gz` extension
pub fn open_table<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Read>> {
    let path = path.as_ref();
    let handle = BufReader::new(fs::File::open(path)?);
    if is_gzipped(path) {
        Ok(Box::new(MultiGzDecoder::new(handle)))
    } else {
        Ok(Box::new(handle))
    }
}

fn make_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(reader)
}

fn require_columns<R: Read>(
    reader: &mut csv::Reader<R>,
    table: InputTableKind,
    columns: &[&str],
) -> Result<(), InputError> {
    let headers = reader.headers()?;
    for column in columns {
        if !headers.iter().any(|h| h == *column) {
            return Err(InputError::MissingColumn {
                table,
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Blank, `NaN` and infinite intensities are treated as absent
fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

#[derive(Debug, Deserialize)]
struct IdentificationRow {
    #[serde(rename = "Raw file")]
    raw_file: String,
    #[serde(rename = "Modified sequence")]
    modified_sequence: String,
    #[serde(rename = "Charge")]
    charge: i32,
    #[serde(rename = "Intensity", default, deserialize_with = "csv::invalid_option")]
    intensity: Option<f64>,
    #[serde(rename = "Retention time")]
    retention_time: f64,
    #[serde(rename = "m/z")]
    mz: f64,
    #[serde(rename = "Mass")]
    mass: f64,
    #[serde(
        rename = "Number of isotopic peaks",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    isotopic_peak_count: Option<f64>,
    #[serde(
        rename = "Ion mobility index",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    ion_mobility_index: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DetectionRow {
    #[serde(rename = "Raw file")]
    raw_file: String,
    #[serde(rename = "Charge")]
    charge: i32,
    #[serde(rename = "Intensity", default, deserialize_with = "csv::invalid_option")]
    intensity: Option<f64>,
    #[serde(rename = "Retention time")]
    retention_time: f64,
    #[serde(rename = "m/z")]
    mz: f64,
    #[serde(rename = "Mass")]
    mass: f64,
    #[serde(
        rename = "Number of isotopic peaks",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    isotopic_peak_count: Option<f64>,
    #[serde(
        rename = "Ion mobility index",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    ion_mobility_index: Option<f64>,
}

macro_rules! select_shape {
    ($row:expr, $attributes:expr) => {
        match $attributes.shape {
            $crate::feature::ShapeAttribute::IsotopicPeakCount => $row.isotopic_peak_count,
            $crate::feature::ShapeAttribute::IonMobilityIndex => $row.ion_mobility_index,
        }
        .unwrap_or(f64::NAN)
    };
}

/// Read the identification table from an arbitrary stream
pub fn read_identifications_from<R: Read>(
    reader: R,
    attributes: &AttributeSet,
) -> Result<Vec<Identification>, InputError> {
    let mut reader = make_reader(reader);
    require_columns(
        &mut reader,
        InputTableKind::Identifications,
        &[
            RAW_FILE_COLUMN,
            MODIFIED_SEQUENCE_COLUMN,
            CHARGE_COLUMN,
            INTENSITY_COLUMN,
            RETENTION_TIME_COLUMN,
            MZ_COLUMN,
            MASS_COLUMN,
            attributes.shape.column_name(),
        ],
    )?;
    let mut acc = Vec::new();
    for row in reader.deserialize() {
        let row: IdentificationRow = row?;
        let shape = select_shape!(row, attributes);
        let feature = PeptideFeature::new(
            row.raw_file,
            row.charge,
            present(row.intensity),
            row.retention_time,
            row.mz,
            row.mass,
            shape,
        );
        acc.push(Identification::new(row.modified_sequence, feature));
    }
    Ok(acc)
}

/// Read the detection table from an arbitrary stream
pub fn read_detections_from<R: Read>(
    reader: R,
    attributes: &AttributeSet,
) -> Result<Vec<PeptideFeature>, InputError> {
    let mut reader = make_reader(reader);
    require_columns(
        &mut reader,
        InputTableKind::Detections,
        &[
            RAW_FILE_COLUMN,
            CHARGE_COLUMN,
            INTENSITY_COLUMN,
            RETENTION_TIME_COLUMN,
            MZ_COLUMN,
            MASS_COLUMN,
            attributes.shape.column_name(),
        ],
    )?;
    let mut acc = Vec::new();
    for row in reader.deserialize() {
        let row: DetectionRow = row?;
        let shape = select_shape!(row, attributes);
        acc.push(PeptideFeature::new(
            row.raw_file,
            row.charge,
            present(row.intensity),
            row.retention_time,
            row.mz,
            row.mass,
            shape,
        ));
    }
    Ok(acc)
}

pub fn read_identifications<P: AsRef<Path>>(
    path: P,
    attributes: &AttributeSet,
) -> Result<Vec<Identification>, InputError> {
    let path = path.as_ref();
    let idents = read_identifications_from(open_table(path)?, attributes)?;
    debug!("Read {} identifications from {}", idents.len(), path.display());
    Ok(idents)
}

pub fn read_detections<P: AsRef<Path>>(
    path: P,
    attributes: &AttributeSet,
) -> Result<Vec<PeptideFeature>, InputError> {
    let path = path.as_ref();
    let detections = read_detections_from(open_table(path)?, attributes)?;
    debug!("Read {} detections from {}", detections.len(), path.display());
    Ok(detections)
}

#[derive(Debug, Deserialize)]
struct RunGroupRow {
    #[serde(rename = "Raw file")]
    raw_file: String,
    #[serde(rename = "Group")]
    group: String,
}

/// Read a two-column (`Raw file`, `Group`) table restricting propagation to runs
/// of the same group
pub fn read_run_groups_from<R: Read>(reader: R) -> Result<RunGroups, InputError> {
    let mut reader = make_reader(reader);
    require_columns(
        &mut reader,
        InputTableKind::RunGroups,
        &[RAW_FILE_COLUMN, GROUP_COLUMN],
    )?;
    let mut groups = HashMap::new();
    for row in reader.deserialize() {
        let row: RunGroupRow = row?;
        groups.insert(row.raw_file, row.group);
    }
    Ok(RunGroups::restricted(groups))
}

pub fn read_run_groups<P: AsRef<Path>>(path: P) -> Result<RunGroups, InputError> {
    read_run_groups_from(open_table(path)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::ShapeAttribute;

    const EVIDENCE: &str = "Raw file\tModified sequence\tCharge\tIntensity\tRetention time\tm/z\tMass\tNumber of isotopic peaks\tScore
A\t_PEPTIDEK_\t2\t100\t10\t500\t998\t3\t120.5
B\t_PEPTIDEK_\t2\t\t10.2\t500\t998\t3\t80.1
B\t_OTHERK_\t3\tNaN\t22\t410\t1227\t4\t70.0
";

    const ALL_PEPTIDES: &str = "Raw file\tCharge\tm/z\tMass\tIntensity\tRetention time\tNumber of isotopic peaks\tIon mobility index
A\t2\t500\t998\t100\t10\t3\t800
B\t2\t500.2\t998.1\t90\t10.1\t3\t801
";

    #[test]
    fn test_read_identifications() -> Result<(), InputError> {
        let idents = read_identifications_from(EVIDENCE.as_bytes(), &AttributeSet::default())?;
        assert_eq!(idents.len(), 3);
        assert_eq!(idents[0].species.as_str(), "_PEPTIDEK_2");
        assert_eq!(idents[0].feature.intensity, Some(100.0));
        assert_eq!(idents[0].feature.shape, 3.0);
        assert_eq!(idents[1].feature.intensity, None);
        assert_eq!(idents[2].feature.intensity, None);
        Ok(())
    }

    #[test]
    fn test_read_detections_ion_mobility() -> Result<(), InputError> {
        let attrs = AttributeSet::new(ShapeAttribute::IonMobilityIndex);
        let dets = read_detections_from(ALL_PEPTIDES.as_bytes(), &attrs)?;
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[1].shape, 801.0);
        assert_eq!(dets[1].intensity, Some(90.0));
        Ok(())
    }

    #[test]
    fn test_missing_column() {
        let attrs = AttributeSet::new(ShapeAttribute::IonMobilityIndex);
        match read_identifications_from(EVIDENCE.as_bytes(), &attrs) {
            Err(InputError::MissingColumn { table, column }) => {
                assert_eq!(table, InputTableKind::Identifications);
                assert_eq!(column, "Ion mobility index");
            }
            other => panic!("Expected a missing column error, got {other:?}"),
        }
    }

    #[test]
    fn test_run_groups() -> Result<(), InputError> {
        let groups = read_run_groups_from("Raw file\tGroup\nA\tx\nB\tx\nC\ty\n".as_bytes())?;
        assert!(groups.shares_group("A", "B"));
        assert!(!groups.shares_group("A", "C"));
        Ok(())
    }

    #[test]
    fn test_table_name_matching() {
        assert!(is_table_for(
            Path::new("txt/evidence.txt"),
            InputTableKind::Identifications
        ));
        assert!(is_table_for(
            Path::new("txt/allPeptides.txt.gz"),
            InputTableKind::Detections
        ));
        assert!(!is_table_for(
            Path::new("txt/allPeptides.csv"),
            InputTableKind::Detections
        ));
        assert!(!is_table_for(
            Path::new("txt/peptides.txt"),
            InputTableKind::Identifications
        ));
    }

    #[test]
    fn test_discover_missing() {
        let dir = std::env::temp_dir().join("mzpip_discover_missing");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("evidence.txt"), EVIDENCE).unwrap();
        let _ = fs::remove_file(dir.join("allPeptides.txt"));
        match InputFiles::discover(&dir) {
            Err(InputError::MissingInputFile { kind, .. }) => {
                assert_eq!(kind, InputTableKind::Detections)
            }
            other => panic!("Expected a missing input error, got {other:?}"),
        }
        fs::write(dir.join("allPeptides.txt"), ALL_PEPTIDES).unwrap();
        let files = InputFiles::discover(&dir).unwrap();
        let (idents, dets) = files.read(&AttributeSet::default()).unwrap();
        assert_eq!(idents.len(), 3);
        assert_eq!(dets.len(), 2);
    }
}
