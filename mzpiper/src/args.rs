use std::fmt::Display;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    #[default]
    /// One row per run and peptide, with an optional weight column
    Long,
    /// One row per peptide and one column per run
    Wide,
}

impl Display for OutputLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputLayout::Long => write!(f, "long"),
            OutputLayout::Wide => write!(f, "wide"),
        }
    }
}

pub(crate) fn non_negative_float_f64(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value < 0.0 {
        Err(format!("`{s}` is less than zero"))
    } else {
        Ok(value)
    }
}

pub(crate) fn positive_usize(s: &str) -> Result<usize, String> {
    let value = s.parse::<usize>().map_err(|e| e.to_string())?;
    if value == 0 {
        Err(format!("`{s}` must be at least one"))
    } else {
        Ok(value)
    }
}
