use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use super::{ExportError, ReportSink};
use crate::analyzer::{AnalysisOutcome, AnalysisReport};

pub fn write_summary_json<W: Write>(out: W, report: &AnalysisReport) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(out, report)?;
    Ok(())
}

/// Writes the analysis report (counts, date range, per-file diagnostics)
/// as pretty JSON.
pub struct SummaryJsonSink {
    path: PathBuf,
}

impl SummaryJsonSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for SummaryJsonSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, outcome: &AnalysisOutcome) -> Result<(), ExportError> {
        let mut out = BufWriter::new(File::create(&self.path)?);
        write_summary_json(&mut out, &outcome.report)?;
        out.flush()?;
        tracing::info!(path = %self.path.display(), "summary written");
        Ok(())
    }
}
