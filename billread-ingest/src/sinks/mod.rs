pub mod csv_export;
pub mod summary_json;

use std::path::Path;

use crate::analyzer::AnalysisOutcome;

pub use csv_export::{write_combined_csv, CombinedCsvSink};
pub use summary_json::{write_summary_json, SummaryJsonSink};

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("nothing to export: the dataset is empty")]
    NoData,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timestamp formatting error: {0}")]
    Format(#[from] time::error::Format),
}

/// Destination for a finished analysis.
pub trait ReportSink {
    fn path(&self) -> &Path;

    fn write(&self, outcome: &AnalysisOutcome) -> Result<(), ExportError>;
}
