//! Folder orchestration: run every matching file through the pipeline,
//! collect diagnostics and merge the results into one dataset.

mod report;

use std::path::{Path, PathBuf};

use billread_client::{
    queries::{company_totals, hourly_rollup},
    CombinedDataset, GridReading,
};
use glob::MatchOptions;
use serde::{Deserialize, Serialize};
use time::macros::time;
use time::{Date, Month, PrimitiveDateTime, Time};
use tracing::{info, warn};

pub use report::{
    AnalysisError, AnalysisOutcome, AnalysisReport, CombinedStats, DateRange, FileDiagnostic, FileErrorEntry,
};

use crate::pipeline::{process_file, IngestSettings};
use crate::progress::{notify, ProgressEvent, ProgressSink};
use crate::sources::SourceFormat;
use crate::transform::grid::{parse_clock, MonthPeriod};

pub const DEFAULT_START_TIME: &str = "00:00";
pub const DEFAULT_END_TIME: &str = "00:15";
const LAST_MINUTE_OF_DAY: Time = time!(23:59);

/// Output granularity of a range analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// The grid each file was projected onto.
    #[default]
    Native,
    /// Present values summed per company and clock hour.
    Hourly,
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "15min" => Ok(Self::Native),
            "hourly" | "1h" => Ok(Self::Hourly),
            other => Err(format!("unknown resolution '{other}' (expected native or hourly)")),
        }
    }
}

/// A single-month analysis. `month` and `year` are optional only so that
/// their absence can be reported as [`AnalysisError::MissingPeriod`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub folder: PathBuf,
    pub month: Option<u8>,
    pub year: Option<i32>,
    pub start_time: String,
    pub end_time: String,
    pub format: SourceFormat,
}

impl AnalysisRequest {
    pub fn new<P: Into<PathBuf>>(folder: P, month: Option<u8>, year: Option<i32>) -> Self {
        Self {
            folder: folder.into(),
            month,
            year,
            start_time: DEFAULT_START_TIME.to_string(),
            end_time: DEFAULT_END_TIME.to_string(),
            format: SourceFormat::Csv,
        }
    }
}

/// An analysis over `[start, end]`, possibly spanning several months.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRequest {
    pub folder: PathBuf,
    pub start: PrimitiveDateTime,
    pub end: PrimitiveDateTime,
    pub resolution: Resolution,
    pub format: SourceFormat,
}

/// What one month of one folder produced.
struct MonthRun {
    total_files: usize,
    readings: Vec<Vec<GridReading>>,
    details: Vec<FileDiagnostic>,
    errors: Vec<FileErrorEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    settings: IngestSettings,
}

impl Analyzer {
    pub fn new(settings: IngestSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Analyze one calendar month of a folder.
    ///
    /// Per-file failures become diagnostics; the run only fails when the
    /// request is invalid, the folder has no matching files, or no file
    /// produced rows.
    pub fn analyze(
        &self,
        request: &AnalysisRequest,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let (Some(month), Some(year)) = (request.month.filter(|m| *m != 0), request.year.filter(|y| *y != 0)) else {
            return Err(AnalysisError::MissingPeriod);
        };
        let start = clock(&request.start_time)?;
        let end = clock(&request.end_time)?;
        let period = MonthPeriod::new(year, month, start, end)
            .map_err(|e| AnalysisError::InvalidPeriod(format!("{year}-{month}: {e}")))?;

        let files = list_files(&request.folder, request.format)?;
        let run = self.run_month(&files, request.format, &period, progress);
        let processed = run.details.iter().filter(|d| d.success).count();
        notify(
            progress,
            ProgressEvent::BatchFinished {
                processed,
                failed: run.errors.len(),
            },
        );

        if run.readings.is_empty() {
            return Err(AnalysisError::AllFilesFailed { errors: run.errors });
        }

        let dataset = CombinedDataset::concat(run.readings);
        metrics::counter!("billread_grid_rows_total").increment(dataset.len() as u64);
        Ok(outcome(&request.folder, run.total_files, processed, run.details, run.errors, dataset, None))
    }

    /// Analyze every month touched by `[start, end]` and keep the rows
    /// inside that window.
    ///
    /// The first month's grid starts at the start time of day and the last
    /// month's ends at the end time; interior months cover whole days.
    /// Diagnostics of the same file are merged across months.
    pub fn analyze_range(
        &self,
        request: &RangeRequest,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        if request.start > request.end {
            return Err(AnalysisError::InvalidPeriod(format!(
                "start {} is after end {}",
                request.start, request.end
            )));
        }

        let files = list_files(&request.folder, request.format)?;
        let months = months_between(request.start.date(), request.end.date());

        let mut readings = Vec::new();
        let mut details: Vec<FileDiagnostic> = Vec::new();
        for (i, (year, month)) in months.iter().copied().enumerate() {
            let start = if i == 0 { request.start.time() } else { Time::MIDNIGHT };
            let end = if i + 1 == months.len() { request.end.time() } else { LAST_MINUTE_OF_DAY };
            let period = MonthPeriod::new(year, month as u8, start, end)
                .map_err(|e| AnalysisError::InvalidPeriod(format!("{year}-{month}: {e}")))?;

            notify(progress, ProgressEvent::MonthStarted { year, month: month as u8 });
            let run = self.run_month(&files, request.format, &period, progress);
            readings.extend(run.readings);
            for diagnostic in run.details {
                match details.iter_mut().find(|d| d.filename == diagnostic.filename) {
                    Some(existing) => existing.absorb(diagnostic),
                    None => details.push(diagnostic),
                }
            }
        }

        let errors: Vec<FileErrorEntry> = details
            .iter()
            .filter(|d| !d.success)
            .map(|d| FileErrorEntry {
                filename: d.filename.clone(),
                error: d.error.clone().unwrap_or_default(),
            })
            .collect();
        let processed = details.len() - errors.len();
        notify(
            progress,
            ProgressEvent::BatchFinished {
                processed,
                failed: errors.len(),
            },
        );
        if readings.is_empty() {
            return Err(AnalysisError::AllFilesFailed { errors });
        }

        let combined = CombinedDataset::concat(readings).merge_duplicates();
        let before_filter = combined.len();
        let mut dataset = combined.retain_between(request.start, request.end);
        if request.resolution == Resolution::Hourly {
            dataset = hourly_rollup(&dataset);
        }
        metrics::counter!("billread_grid_rows_total").increment(dataset.len() as u64);
        info!(
            months = months.len(),
            rows_before_filter = before_filter,
            rows = dataset.len(),
            resolution = ?request.resolution,
            "range analysis finished"
        );

        Ok(outcome(
            &request.folder,
            files.len(),
            processed,
            details,
            errors,
            dataset,
            Some(before_filter),
        ))
    }

    fn run_month(
        &self,
        files: &[PathBuf],
        format: SourceFormat,
        period: &MonthPeriod,
        progress: Option<&dyn ProgressSink>,
    ) -> MonthRun {
        let total = files.len();
        notify(progress, ProgressEvent::FilesFound { total });

        let mut run = MonthRun {
            total_files: total,
            readings: Vec::new(),
            details: Vec::with_capacity(total),
            errors: Vec::new(),
        };

        for (i, path) in files.iter().enumerate() {
            let filename = file_name(path);
            notify(
                progress,
                ProgressEvent::FileStarted {
                    index: i + 1,
                    total,
                    filename: filename.clone(),
                },
            );

            let source = format.open(path);
            match process_file(source.as_ref(), period, &self.settings) {
                Ok(output) => {
                    metrics::counter!("billread_files_processed_total").increment(1);
                    let diagnostic = FileDiagnostic::succeeded(&filename, &output);
                    info!(file = %filename, rows = diagnostic.rows, interval_minutes = ?diagnostic.interval_minutes, "file processed");
                    notify(
                        progress,
                        ProgressEvent::FileFinished {
                            filename: filename.clone(),
                            rows: diagnostic.rows,
                        },
                    );
                    run.details.push(diagnostic);
                    run.readings.extend(output.sets.into_iter().map(|set| set.readings));
                }
                Err(e) => {
                    metrics::counter!("billread_files_failed_total").increment(1);
                    warn!(file = %filename, error = %e, "file failed");
                    notify(
                        progress,
                        ProgressEvent::FileFailed {
                            filename: filename.clone(),
                            error: e.to_string(),
                        },
                    );
                    run.details.push(FileDiagnostic::failed(&filename, e.to_string()));
                    run.errors.push(FileErrorEntry {
                        filename,
                        error: e.to_string(),
                    });
                }
            }
        }

        run
    }
}

fn clock(raw: &str) -> Result<Time, AnalysisError> {
    parse_clock(raw).ok_or_else(|| AnalysisError::InvalidTime(raw.to_string()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn outcome(
    folder: &Path,
    total_files: usize,
    processed_files: usize,
    details: Vec<FileDiagnostic>,
    errors: Vec<FileErrorEntry>,
    dataset: CombinedDataset,
    rows_before_filter: Option<usize>,
) -> AnalysisOutcome {
    let combined_stats = CombinedStats {
        rows_before_filter,
        ..CombinedStats::of(&dataset)
    };
    info!(
        folder = %folder.display(),
        processed_files,
        failed_files = errors.len(),
        rows = combined_stats.total_rows,
        kwh_values = combined_stats.kwh_values,
        kvarh_values = combined_stats.kvarh_values,
        "analysis finished"
    );

    AnalysisOutcome {
        report: AnalysisReport {
            folder: folder.display().to_string(),
            total_files,
            processed_files,
            error_files: errors.len(),
            date_range: DateRange::of(&dataset),
            combined_stats,
            company_totals: company_totals(&dataset),
            details,
            errors,
        },
        dataset,
    }
}

/// Matching files in `folder`, extension compared case-insensitively,
/// sorted by path.
pub fn list_files(folder: &Path, format: SourceFormat) -> Result<Vec<PathBuf>, AnalysisError> {
    let pattern_text = format!("*.{}", format.extension());
    let pattern = Path::new(&glob::Pattern::escape(&folder.to_string_lossy()))
        .join(&pattern_text)
        .to_string_lossy()
        .into_owned();
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut files = Vec::new();
    for entry in glob::glob_with(&pattern, options)? {
        let path = entry.map_err(|e| AnalysisError::Io {
            folder: folder.display().to_string(),
            source: e.into(),
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(AnalysisError::FolderEmpty {
            folder: folder.display().to_string(),
            pattern: pattern_text,
        });
    }
    Ok(files)
}

/// `(year, month)` pairs from `start`'s month through `end`'s, inclusive.
fn months_between(start: Date, end: Date) -> Vec<(i32, Month)> {
    let mut out = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());
    while (year, month as u8) <= (end.year(), end.month() as u8) {
        out.push((year, month));
        if month == Month::December {
            year += 1;
        }
        month = month.next();
    }
    out
}
