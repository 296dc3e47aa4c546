use std::{collections::BTreeMap, path::Path};

use billread_client::GridReading;
use time::PrimitiveDateTime;
use tracing::{debug, info};

use crate::sources::{table::path_company, LoadError, LoadOptions, LoadedTable, RawRow, SourceEncoding, SourceFormat};
use crate::transform::{
    aggregate::aggregate_energy,
    classify::{self, ColumnView},
    grid::{infer_interval_minutes, MonthPeriod, TimeGrid, DEFAULT_INTERVAL_MINUTES},
    reindex,
    timestamp::parse_timestamp,
};

/// A meter export on disk that can be decoded into a raw table.
pub trait Source: Send + Sync {
    fn path(&self) -> &Path;

    fn format(&self) -> SourceFormat;

    /// Split the text from the header row on into records, header first.
    fn records(&self, body: &str) -> Vec<Result<Vec<String>, LoadError>>;

    /// Company identifier for rows that do not name one: the file stem.
    fn company(&self) -> String {
        path_company(self.path())
    }

    fn load(&self, options: &LoadOptions) -> Result<LoadedTable, LoadError> {
        crate::sources::table::load_source(self, options)
    }
}

/// Why a single file produced no rows.
#[derive(thiserror::Error, Debug)]
pub enum FileError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("no parsable timestamps in column '{column}'")]
    NoParsableTimestamps { column: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestSettings {
    pub load: LoadOptions,
    pub timestamp_sample_size: usize,
    pub numeric_density_threshold: f64,
    pub default_interval_minutes: i64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            load: LoadOptions::default(),
            timestamp_sample_size: 20,
            numeric_density_threshold: 0.5,
            default_interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

/// One company's readings over the full grid of the requested month.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyReadingSet {
    pub company: String,
    pub interval_minutes: i64,
    pub readings: Vec<GridReading>,
}

impl CompanyReadingSet {
    pub fn kwh_values(&self) -> usize {
        self.readings.iter().filter(|r| r.kwh.is_some()).count()
    }

    pub fn kvarh_values(&self) -> usize {
        self.readings.iter().filter(|r| r.kvarh.is_some()).count()
    }
}

/// Everything one file contributed, plus what was detected on the way.
#[derive(Debug, Clone)]
pub struct FileOutput {
    pub sets: Vec<CompanyReadingSet>,
    pub encoding: SourceEncoding,
    pub header_offset: usize,
    pub timestamp_column: Option<String>,
    pub kwh_columns: Vec<String>,
    pub kvarh_columns: Vec<String>,
    pub unparsed_timestamps: usize,
    pub note: Option<String>,
}

impl FileOutput {
    pub fn rows(&self) -> usize {
        self.sets.iter().map(|s| s.readings.len()).sum()
    }

    pub fn interval_minutes(&self) -> Option<i64> {
        self.sets.first().map(|s| s.interval_minutes)
    }
}

fn names(columns: &[String], idx: &[usize]) -> Vec<String> {
    idx.iter().filter_map(|&i| columns.get(i).cloned()).collect()
}

/// Run one file through the whole chain: load, classify, parse, grid,
/// aggregate and reindex.
///
/// A file without a recognisable timestamp column still yields an
/// all-absent set over the default grid so every file is represented.
pub fn process_file(
    source: &dyn Source,
    period: &MonthPeriod,
    settings: &IngestSettings,
) -> Result<FileOutput, FileError> {
    let loaded = source.load(&settings.load)?;
    let table = &loaded.table;
    let view = ColumnView::of_table(table);
    let fallback_company = source.company();

    let Some(ts_col) = classify::classify_timestamp(&view, settings.timestamp_sample_size) else {
        let grid = TimeGrid::for_month(period, settings.default_interval_minutes);
        debug!(file = %source.path().display(), "no timestamp column, emitting empty grid");
        return Ok(FileOutput {
            sets: vec![CompanyReadingSet {
                readings: grid
                    .points()
                    .iter()
                    .map(|ts| GridReading::absent(fallback_company.as_str(), *ts))
                    .collect(),
                company: fallback_company,
                interval_minutes: grid.interval_minutes(),
            }],
            encoding: loaded.encoding,
            header_offset: loaded.header_offset,
            timestamp_column: None,
            kwh_columns: Vec::new(),
            kvarh_columns: Vec::new(),
            unparsed_timestamps: 0,
            note: Some(format!(
                "no timestamp column detected; empty {}-minute grid emitted",
                grid.interval_minutes()
            )),
        });
    };

    let timed: Vec<(PrimitiveDateTime, &RawRow)> = table
        .rows
        .iter()
        .filter_map(|row| parse_timestamp(row.cell(ts_col)).map(|ts| (ts, row)))
        .collect();
    let unparsed = table.rows.len() - timed.len();
    if unparsed > 0 {
        metrics::counter!("billread_unparsed_timestamps_total").increment(unparsed as u64);
    }
    if timed.is_empty() {
        return Err(FileError::NoParsableTimestamps {
            column: view.name(ts_col).to_string(),
        });
    }

    let company_col = classify::company_column(&view).filter(|&c| c != ts_col);
    let excluded: Vec<usize> = std::iter::once(ts_col).chain(company_col).collect();
    let eligible = classify::value_columns(&view, &excluded);

    let timed_view = ColumnView::new(&table.columns, timed.iter().map(|(_, row)| *row).collect());
    let candidates = classify::classify_energy(&timed_view, &eligible);

    let mut partitions: BTreeMap<String, (Vec<PrimitiveDateTime>, Vec<&RawRow>)> = BTreeMap::new();
    for (ts, row) in &timed {
        let company = company_col
            .map(|c| row.cell(c).trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback_company.clone());
        let entry = partitions.entry(company).or_default();
        entry.0.push(*ts);
        entry.1.push(*row);
    }

    let mut sets = Vec::with_capacity(partitions.len());
    let mut chosen = None;
    for (company, (timestamps, rows)) in partitions {
        let part = ColumnView::new(&table.columns, rows);
        let interval = infer_interval_minutes(&timestamps, settings.default_interval_minutes);
        let grid = TimeGrid::for_month(period, interval);
        let energy = aggregate_energy(
            &part,
            &timestamps,
            &candidates,
            &eligible,
            settings.numeric_density_threshold,
        );
        debug!(
            file = %source.path().display(),
            company = %company,
            interval_minutes = interval,
            kwh_columns = ?energy.kwh_columns,
            kvarh_columns = ?energy.kvarh_columns,
            fallback = energy.used_fallback,
            "aggregated energy"
        );

        let readings = reindex(&grid, &energy, &company);
        chosen.get_or_insert_with(|| energy.clone());
        sets.push(CompanyReadingSet {
            company,
            interval_minutes: grid.interval_minutes(),
            readings,
        });
    }

    let energy = chosen.unwrap_or_default();
    let note = energy
        .used_fallback
        .then(|| "energy columns chosen by valid-value count".to_string());

    info!(
        file = %source.path().display(),
        companies = sets.len(),
        unparsed,
        "file normalized"
    );

    Ok(FileOutput {
        sets,
        encoding: loaded.encoding,
        header_offset: loaded.header_offset,
        timestamp_column: Some(view.name(ts_col).to_string()),
        kwh_columns: names(&table.columns, &energy.kwh_columns),
        kvarh_columns: names(&table.columns, &energy.kvarh_columns),
        unparsed_timestamps: unparsed,
        note,
    })
}
