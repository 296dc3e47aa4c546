use std::{fs, path::Path};

use tracing::debug;

use super::{header, SourceEncoding};
use crate::pipeline::Source;

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not load file with any encoding (tried {tried}): {last}")]
    NoEncoding { tried: String, last: String },
    #[error("no usable columns in header row {offset}")]
    NoColumns { offset: usize },
    #[error("malformed delimited record: {0}")]
    Record(String),
}

/// One data row as read from the file: untyped cells aligned with the
/// table's retained columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// Zero-based line of the row, counted from the header row.
    pub line: usize,
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn cell(&self, col: usize) -> &str {
        self.cells.get(col).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Assemble a table from header-first records.
    ///
    /// Column names are trimmed and synthetic ones (blank or `Unnamed...`)
    /// are dropped together with their cells. Short rows are padded, rows
    /// wider than the header (with non-empty overflow) and unreadable
    /// records are skipped and counted. Fully empty rows are dropped.
    pub fn from_records<I>(records: I) -> (Self, usize)
    where
        I: IntoIterator<Item = Result<Vec<String>, LoadError>>,
    {
        let mut records = records.into_iter();
        let mut malformed = 0usize;

        let header = loop {
            match records.next() {
                Some(Ok(fields)) => break fields,
                Some(Err(e)) => {
                    debug!(error = %e, "unreadable header record");
                    malformed += 1;
                }
                None => return (Self::default(), malformed),
            }
        };

        let keep: Vec<usize> = header
            .iter()
            .enumerate()
            .filter(|(_, name)| !is_synthetic_name(name))
            .map(|(idx, _)| idx)
            .collect();
        let columns = keep.iter().map(|&idx| header[idx].trim().to_string()).collect();

        let mut rows = Vec::new();
        for (line, record) in records.enumerate() {
            let fields = match record {
                Ok(fields) => fields,
                Err(e) => {
                    debug!(line = line + 1, error = %e, "skipping unreadable record");
                    malformed += 1;
                    continue;
                }
            };
            if fields.len() > header.len() && fields[header.len()..].iter().any(|f| !f.trim().is_empty()) {
                debug!(line = line + 1, fields = fields.len(), "skipping row wider than header");
                malformed += 1;
                continue;
            }

            let cells: Vec<String> = keep
                .iter()
                .map(|&idx| fields.get(idx).map(|f| f.trim().to_string()).unwrap_or_default())
                .collect();
            if cells.iter().all(String::is_empty) {
                continue;
            }
            rows.push(RawRow { line: line + 1, cells });
        }

        (Self { columns, rows }, malformed)
    }
}

fn is_synthetic_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty() || trimmed.to_ascii_lowercase().starts_with("unnamed")
}

/// Knobs for the encoding fallback and header search.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub encodings: Vec<SourceEncoding>,
    pub header_scan_lines: usize,
    pub min_header_fields: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            encodings: SourceEncoding::DEFAULT_ORDER.to_vec(),
            header_scan_lines: header::HEADER_SCAN_LINES,
            min_header_fields: header::MIN_HEADER_FIELDS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: RawTable,
    pub encoding: SourceEncoding,
    pub header_offset: usize,
    pub malformed_rows: usize,
}

/// Decode, locate the header and split a source file, walking the
/// configured encodings until one yields at least one column.
pub fn load_source<S>(source: &S, options: &LoadOptions) -> Result<LoadedTable, LoadError>
where
    S: Source + ?Sized,
{
    let path = source.path();
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut last = String::from("no encodings configured");
    for &encoding in &options.encodings {
        let Some(text) = encoding.decode(&bytes) else {
            debug!(file = %path.display(), encoding = encoding.label(), "decode failed, trying next encoding");
            last = format!("invalid {} text", encoding.label());
            continue;
        };

        match split_text(source, &text, options) {
            Ok((table, header_offset, malformed_rows)) => {
                if malformed_rows > 0 {
                    metrics::counter!("billread_malformed_rows_total").increment(malformed_rows as u64);
                }
                return Ok(LoadedTable {
                    table,
                    encoding,
                    header_offset,
                    malformed_rows,
                });
            }
            Err(e) => {
                debug!(file = %path.display(), encoding = encoding.label(), error = %e, "load attempt failed");
                last = e.to_string();
            }
        }
    }

    Err(LoadError::NoEncoding {
        tried: options
            .encodings
            .iter()
            .map(SourceEncoding::label)
            .collect::<Vec<_>>()
            .join(", "),
        last,
    })
}

fn split_text<S>(source: &S, text: &str, options: &LoadOptions) -> Result<(RawTable, usize, usize), LoadError>
where
    S: Source + ?Sized,
{
    let lines: Vec<&str> = text.lines().collect();
    let scan = &lines[..lines.len().min(options.header_scan_lines)];
    let offset = header::locate_header(scan, source.format(), options.min_header_fields);

    let body = lines[offset.min(lines.len())..].join("\n");
    let (table, malformed) = RawTable::from_records(source.records(&body));
    if table.columns.is_empty() {
        return Err(LoadError::NoColumns { offset });
    }
    Ok((table, offset, malformed))
}

pub(crate) fn path_company(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(fields: &[&str]) -> Result<Vec<String>, LoadError> {
        Ok(fields.iter().map(|f| f.to_string()).collect())
    }

    #[test]
    fn synthetic_columns_and_empty_rows_are_dropped() {
        let (table, malformed) = RawTable::from_records(vec![
            rec(&[" ReadDateTime ", "Channel 1", "", "Unnamed: 3"]),
            rec(&["01/01/2024 00:00", "1,5", "x", "y"]),
            rec(&["", "", "junk", ""]),
            rec(&["01/01/2024 00:15"]),
        ]);

        assert_eq!(malformed, 0);
        assert_eq!(table.columns, vec!["ReadDateTime", "Channel 1"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells, vec!["01/01/2024 00:00", "1,5"]);
        assert_eq!(table.rows[1].cells, vec!["01/01/2024 00:15", ""]);
        assert_eq!(table.rows[1].line, 3);
    }

    #[test]
    fn wide_and_unreadable_rows_are_skipped_not_fatal() {
        let (table, malformed) = RawTable::from_records(vec![
            rec(&["Fecha", "kWh"]),
            rec(&["01/01/2024 00:00", "1", "extra"]),
            Err(LoadError::Record("bad quote".to_string())),
            rec(&["01/01/2024 00:15", "2", ""]),
        ]);

        assert_eq!(malformed, 2);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].cells, vec!["01/01/2024 00:15", "2"]);
    }

    #[test]
    fn empty_input_yields_no_columns() {
        let (table, malformed) = RawTable::from_records(Vec::new());
        assert!(table.columns.is_empty());
        assert_eq!(malformed, 0);
    }

    #[test]
    fn company_comes_from_the_file_stem() {
        assert_eq!(path_company(Path::new("/data/ACME Norte.csv")), "ACME Norte");
    }
}
