use std::path::{Path, PathBuf};

use super::{table::LoadError, SourceFormat};
use crate::pipeline::Source;

/// Comma separated meter export.
///
/// The header row is wherever the header locator puts it; rows before it
/// are ignored. Quoted fields are honoured, so thousands separators and
/// decimal commas inside quotes stay in one cell.
pub struct MeterCsvFileSource {
    path: PathBuf,
}

impl MeterCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl Source for MeterCsvFileSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }

    fn records(&self, body: &str) -> Vec<Result<Vec<String>, LoadError>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(body.as_bytes());

        rdr.records()
            .map(|result| {
                result
                    .map(|record| record.iter().map(str::to_string).collect())
                    .map_err(|e| LoadError::Record(e.to_string()))
            })
            .collect()
    }
}
