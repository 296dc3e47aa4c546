pub mod encoding;
pub mod header;
pub mod meter_csv_file;
pub mod meter_prn_file;
pub mod table;

use std::{fmt, path::Path, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use encoding::SourceEncoding;
pub use header::locate_header;
pub use meter_csv_file::MeterCsvFileSource;
pub use meter_prn_file::MeterPrnFileSource;
pub use table::{LoadError, LoadOptions, LoadedTable, RawRow, RawTable};

use crate::pipeline::Source;

/// PRN header candidates are split on tabs or runs of two or more spaces,
/// so single-space labels like `Channel 1` survive. Data rows are placed
/// by column position in [`MeterPrnFileSource`].
static PRN_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\t+|\s{2,}").expect("prn separator pattern is valid"));

/// Layout of a meter export on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Csv,
    Prn,
}

impl SourceFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Prn => "prn",
        }
    }

    /// Split a raw line into trimmed fields (not quote-aware). Used to score
    /// header candidates; blank PRN cells are not preserved here.
    pub fn split_fields<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            Self::Csv => line.split(',').map(str::trim).collect(),
            Self::Prn => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    Vec::new()
                } else {
                    PRN_SEPARATOR.split(trimmed).map(str::trim).collect()
                }
            }
        }
    }

    pub fn field_count(&self, line: &str) -> usize {
        self.split_fields(line).len()
    }

    /// Format implied by a file's extension, if it is a known one.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }

    /// Build the file source for `path` in this format.
    pub fn open(&self, path: &Path) -> Box<dyn Source> {
        match self {
            Self::Csv => Box::new(MeterCsvFileSource::new(path)),
            Self::Prn => Box::new(MeterPrnFileSource::new(path)),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "prn" => Ok(Self::Prn),
            other => Err(format!("unknown source format '{other}' (expected csv or prn)")),
        }
    }
}
