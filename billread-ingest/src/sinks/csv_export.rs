use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use billread_client::CombinedDataset;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tracing::info;

use super::{ExportError, ReportSink};
use crate::analyzer::AnalysisOutcome;

pub const EXPORT_HEADER: [&str; 4] = ["company", "timestamp", "kwh", "kvarh"];
const EXPORT_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
/// Spreadsheet tools only detect UTF-8 when the file starts with a BOM.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write the dataset as a flat, BOM-prefixed UTF-8 CSV. Absent readings
/// are empty fields. Returns the number of data rows written.
pub fn write_combined_csv<W: Write>(mut out: W, dataset: &CombinedDataset) -> Result<usize, ExportError> {
    if dataset.is_empty() {
        return Err(ExportError::NoData);
    }

    out.write_all(UTF8_BOM)?;
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(EXPORT_HEADER)?;
    for row in dataset.rows() {
        let ts = row.ts.format(EXPORT_TIMESTAMP)?;
        let kwh = format_value(row.kwh);
        let kvarh = format_value(row.kvarh);
        wtr.write_record([row.company.as_str(), ts.as_str(), kwh.as_str(), kvarh.as_str()])?;
    }
    wtr.flush()?;
    Ok(dataset.len())
}

/// Exports the combined dataset to a single CSV file.
pub struct CombinedCsvSink {
    path: PathBuf,
}

impl CombinedCsvSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for CombinedCsvSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, outcome: &AnalysisOutcome) -> Result<(), ExportError> {
        let file = File::create(&self.path)?;
        let rows = write_combined_csv(BufWriter::new(file), &outcome.dataset)?;
        info!(path = %self.path.display(), rows, "combined csv written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalysisRequest, Analyzer};
    use billread_client::GridReading;
    use time::macros::datetime;

    #[test]
    fn writes_bom_iso_timestamps_and_empty_absent_values() {
        let dataset = CombinedDataset::from_rows(vec![
            GridReading {
                company: "norte".into(),
                ts: datetime!(2024-02-01 00:15),
                kwh: Some(0.0),
                kvarh: None,
            },
            GridReading {
                company: "norte".into(),
                ts: datetime!(2024-02-01 00:00),
                kwh: Some(1.25),
                kvarh: Some(3.0),
            },
        ]);

        let mut buf = Vec::new();
        assert_eq!(write_combined_csv(&mut buf, &dataset).unwrap(), 2);
        assert!(buf.starts_with(UTF8_BOM));
        let text = std::str::from_utf8(&buf[UTF8_BOM.len()..]).unwrap();
        assert_eq!(
            text,
            "company,timestamp,kwh,kvarh\n\
             norte,2024-02-01 00:00:00,1.25,3\n\
             norte,2024-02-01 00:15:00,0,\n"
        );
    }

    #[test]
    fn empty_dataset_is_not_exported() {
        let err = write_combined_csv(Vec::new(), &CombinedDataset::default()).unwrap_err();
        assert!(matches!(err, ExportError::NoData));
    }

    #[test]
    fn exported_file_reloads_to_the_same_readings() {
        let input = tempfile::tempdir().unwrap();
        std::fs::write(
            input.path().join("norte.csv"),
            "Reporte\n\
             ReadDateTime,Channel 1,Channel 2,Status Flags\n\
             01/02/2024 12:00:00 a. m.,\"1,5\",0.5,0\n\
             01/02/2024 12:15:00 a. m.,2,,0\n\
             29/02/2024 11:45:00 p. m.,7.125,0,0\n",
        )
        .unwrap();
        std::fs::write(input.path().join("vacio.csv"), "Nombre,Valor,Otro,Mas\na,1,2,3\n").unwrap();

        let analyzer = Analyzer::default();
        let first = analyzer
            .analyze(&AnalysisRequest::new(input.path(), Some(2), Some(2024)), None)
            .unwrap();

        let exported = tempfile::tempdir().unwrap();
        let sink = CombinedCsvSink::new(exported.path().join("combined.csv"));
        sink.write(&first).unwrap();

        let second = analyzer
            .analyze(&AnalysisRequest::new(exported.path(), Some(2), Some(2024)), None)
            .unwrap();

        assert_eq!(second.report.errors.len(), 0);
        assert_eq!(first.dataset.rows(), second.dataset.rows());
        assert_eq!(second.dataset.companies(), vec!["norte", "vacio"]);
    }
}
