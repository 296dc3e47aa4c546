use billread_client::{queries::CompanyTotals, CombinedDataset};
use serde::{Serialize, Serializer};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::PrimitiveDateTime;

use crate::pipeline::FileOutput;

const DISPLAY_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day]/[month]/[year] [hour]:[minute]");

fn display_ts<S: Serializer>(ts: &PrimitiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    let text = ts.format(DISPLAY_FORMAT).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    #[serde(serialize_with = "display_ts")]
    pub start: PrimitiveDateTime,
    #[serde(serialize_with = "display_ts")]
    pub end: PrimitiveDateTime,
}

impl DateRange {
    pub fn of(dataset: &CombinedDataset) -> Option<Self> {
        dataset.bounds().map(|(start, end)| Self { start, end })
    }
}

/// Outcome of one input file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileDiagnostic {
    pub filename: String,
    pub company: Option<String>,
    pub rows: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub kwh_values: usize,
    pub kvarh_values: usize,
    pub date_range: Option<DateRange>,
    pub interval_minutes: Option<i64>,
    pub encoding: Option<String>,
    pub header_offset: Option<usize>,
    pub timestamp_column: Option<String>,
    pub kwh_columns: Vec<String>,
    pub kvarh_columns: Vec<String>,
}

impl FileDiagnostic {
    pub fn succeeded(filename: &str, output: &FileOutput) -> Self {
        let readings = output.sets.iter().flat_map(|s| s.readings.iter());
        let start = readings.clone().map(|r| r.ts).min();
        let end = readings.clone().map(|r| r.ts).max();
        let companies: Vec<&str> = output.sets.iter().map(|s| s.company.as_str()).collect();

        Self {
            filename: filename.to_string(),
            company: Some(companies.join(", ")),
            rows: output.rows(),
            success: true,
            error: None,
            note: output.note.clone(),
            kwh_values: output.sets.iter().map(|s| s.kwh_values()).sum(),
            kvarh_values: output.sets.iter().map(|s| s.kvarh_values()).sum(),
            date_range: start.zip(end).map(|(start, end)| DateRange { start, end }),
            interval_minutes: output.interval_minutes(),
            encoding: Some(output.encoding.label().to_string()),
            header_offset: Some(output.header_offset),
            timestamp_column: output.timestamp_column.clone(),
            kwh_columns: output.kwh_columns.clone(),
            kvarh_columns: output.kvarh_columns.clone(),
        }
    }

    pub fn failed(filename: &str, error: String) -> Self {
        Self {
            filename: filename.to_string(),
            company: None,
            rows: 0,
            success: false,
            error: Some(error),
            note: None,
            kwh_values: 0,
            kvarh_values: 0,
            date_range: None,
            interval_minutes: None,
            encoding: None,
            header_offset: None,
            timestamp_column: None,
            kwh_columns: Vec::new(),
            kvarh_columns: Vec::new(),
        }
    }

    /// Fold the same file's diagnostic from another month into this one.
    pub fn absorb(&mut self, other: FileDiagnostic) {
        self.rows += other.rows;
        self.kwh_values += other.kwh_values;
        self.kvarh_values += other.kvarh_values;
        self.date_range = match (self.date_range, other.date_range) {
            (Some(a), Some(b)) => Some(DateRange {
                start: a.start.min(b.start),
                end: a.end.max(b.end),
            }),
            (a, b) => a.or(b),
        };
        if other.success && !self.success {
            let error = self.error.take();
            *self = FileDiagnostic {
                rows: self.rows,
                kwh_values: self.kwh_values,
                kvarh_values: self.kvarh_values,
                date_range: self.date_range,
                ..other
            };
            if let Some(e) = error {
                self.push_note(format!("failed for some months: {e}"));
            }
        } else {
            let error = if self.success && !other.success { other.error } else { None };
            if self.note.is_none() {
                self.note = other.note;
            }
            if let Some(e) = error {
                self.push_note(format!("failed for some months: {e}"));
            }
        }
    }

    fn push_note(&mut self, text: String) {
        self.note = Some(match self.note.take() {
            Some(note) => format!("{note}; {text}"),
            None => text,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileErrorEntry {
    pub filename: String,
    pub error: String,
}

pub(crate) fn render_errors(errors: &[FileErrorEntry]) -> String {
    if errors.is_empty() {
        return "no details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("- {}: {}", e.filename, e.error))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedStats {
    pub total_rows: usize,
    pub companies: usize,
    pub kwh_values: usize,
    pub kvarh_values: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_before_filter: Option<usize>,
}

impl CombinedStats {
    pub fn of(dataset: &CombinedDataset) -> Self {
        Self {
            total_rows: dataset.len(),
            companies: dataset.companies().len(),
            kwh_values: dataset.kwh_values(),
            kvarh_values: dataset.kvarh_values(),
            rows_before_filter: None,
        }
    }
}

/// Summary of an analysis run, suitable for display or JSON export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub folder: String,
    pub total_files: usize,
    pub processed_files: usize,
    pub error_files: usize,
    pub date_range: Option<DateRange>,
    pub combined_stats: CombinedStats,
    pub company_totals: Vec<CompanyTotals>,
    pub details: Vec<FileDiagnostic>,
    pub errors: Vec<FileErrorEntry>,
}

/// A successful run: the report plus the dataset it describes.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: AnalysisReport,
    pub dataset: CombinedDataset,
}

impl AnalysisOutcome {
    pub fn message(&self) -> String {
        let r = &self.report;
        let mut message = format!(
            "Processed {} of {} files ({} rows, {} companies)",
            r.processed_files, r.total_files, r.combined_stats.total_rows, r.combined_stats.companies
        );
        if r.error_files > 0 {
            message.push_str(&format!("; {} failed", r.error_files));
        }
        message
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("no {pattern} files found in {folder}")]
    FolderEmpty { folder: String, pattern: String },
    #[error("month and year must both be selected")]
    MissingPeriod,
    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("invalid period: {0}")]
    InvalidPeriod(String),
    #[error("no files could be processed\n{}", render_errors(.errors))]
    AllFilesFailed { errors: Vec<FileErrorEntry> },
    #[error("failed to list {folder}: {source}")]
    Io {
        folder: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}
