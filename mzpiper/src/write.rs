use std::fs;
use std::io::{self, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use mzpip::aggregate::{CombinedTable, IntensityMatrix};
use mzpip::io::{INTENSITY_COLUMN, RAW_FILE_COLUMN};

use crate::args::OutputLayout;
use crate::driver::MZPiperError;

pub const PEPTIDE_ID_COLUMN: &str = "PeptideID";
pub const WEIGHT_COLUMN: &str = "Weight";

fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Write one row per record, with the weight column only when the table carries weights
pub fn write_long<W: Write>(
    writer: &mut csv::Writer<W>,
    table: &CombinedTable,
) -> Result<(), csv::Error> {
    if table.weighted {
        writer.write_record([RAW_FILE_COLUMN, PEPTIDE_ID_COLUMN, INTENSITY_COLUMN, WEIGHT_COLUMN])?;
    } else {
        writer.write_record([RAW_FILE_COLUMN, PEPTIDE_ID_COLUMN, INTENSITY_COLUMN])?;
    }
    for rec in table.iter() {
        let intensity = rec.intensity.to_string();
        match rec.weight {
            Some(weight) if table.weighted => {
                let weight = weight.to_string();
                writer.write_record([
                    rec.run.as_str(),
                    rec.species.as_str(),
                    intensity.as_str(),
                    weight.as_str(),
                ])?;
            }
            _ => {
                writer.write_record([rec.run.as_str(), rec.species.as_str(), intensity.as_str()])?;
            }
        }
    }
    Ok(())
}

/// Write one row per species and one column per run, leaving absent cells empty
pub fn write_wide<W: Write>(
    writer: &mut csv::Writer<W>,
    matrix: &IntensityMatrix,
) -> Result<(), csv::Error> {
    let mut header = vec![PEPTIDE_ID_COLUMN];
    header.extend(matrix.runs.iter().map(|r| r.as_str()));
    writer.write_record(&header)?;

    for (species, cells) in matrix.rows() {
        let mut row = Vec::with_capacity(cells.len() + 1);
        row.push(species.to_string());
        row.extend(
            cells
                .iter()
                .map(|c| c.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }
    Ok(())
}

fn write_table<W: Write>(
    sink: W,
    table: &CombinedTable,
    layout: OutputLayout,
) -> Result<W, MZPiperError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(sink);
    match layout {
        OutputLayout::Long => write_long(&mut writer, table)?,
        OutputLayout::Wide => write_wide(&mut writer, &table.to_matrix())?,
    }
    writer
        .into_inner()
        .map_err(|e| MZPiperError::IOError(e.into_error()))
}

/// Write `table` to `path` in the requested layout.
///
/// `-` writes to STDOUT and a `.gz` extension gzip compresses the output.
pub fn write_output(
    path: &Path,
    table: &CombinedTable,
    layout: OutputLayout,
) -> Result<(), MZPiperError> {
    debug!("Writing {} records in the {layout} layout", table.len());
    if path == Path::new("-") {
        let outfile = io::stdout();
        let mut handle = write_table(outfile.lock(), table, layout)?;
        handle.flush()?;
    } else {
        let handle = io::BufWriter::new(fs::File::create(path)?);
        if is_gzipped(path) {
            let encoder = GzEncoder::new(handle, Compression::best());
            let encoder = write_table(encoder, table, layout)?;
            encoder.finish()?.flush()?;
        } else {
            let mut handle = write_table(handle, table, layout)?;
            handle.flush()?;
        }
    }
    Ok(())
}
