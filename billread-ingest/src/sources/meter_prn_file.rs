use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{table::LoadError, SourceFormat};
use crate::pipeline::Source;

/// A run of text in which words are separated by single spaces.
static ALIGNED_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+(?: \S+)*").expect("aligned field pattern is valid"));

/// Whitespace aligned (`.prn`) meter export.
///
/// Same preamble and header rules as the CSV source. When the header line
/// is tab separated every line is split on single tabs. Otherwise the file
/// is read as fixed width: each header label marks a column, and a value
/// lands in the column it sits under, so a blank span stays an empty cell.
pub struct MeterPrnFileSource {
    path: PathBuf,
}

impl MeterPrnFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl Source for MeterPrnFileSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Prn
    }

    fn records(&self, body: &str) -> Vec<Result<Vec<String>, LoadError>> {
        let mut lines = body.lines();
        let Some(header) = lines.next() else {
            return Vec::new();
        };
        let layout = Layout::of_header(header);
        std::iter::once(header)
            .chain(lines)
            .map(|line| Ok(layout.split(line)))
            .collect()
    }
}

/// Character columns `[start, end)` occupied by one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    fn overlap(&self, other: &Span) -> usize {
        self.end.min(other.end).saturating_sub(self.start.max(other.start))
    }

    fn gap(&self, other: &Span) -> usize {
        if other.end <= self.start {
            self.start - other.end
        } else {
            other.start.saturating_sub(self.end)
        }
    }
}

enum Layout {
    Tabbed,
    Aligned(Vec<Span>),
}

impl Layout {
    fn of_header(header: &str) -> Self {
        if header.contains('\t') {
            Self::Tabbed
        } else {
            Self::Aligned(aligned_fields(header).into_iter().map(|(span, _)| span).collect())
        }
    }

    fn split(&self, line: &str) -> Vec<String> {
        match self {
            Self::Tabbed => line.split('\t').map(|f| f.trim().to_string()).collect(),
            Self::Aligned(columns) => slot_fields(columns, line),
        }
    }
}

fn aligned_fields(line: &str) -> Vec<(Span, &str)> {
    ALIGNED_FIELD
        .find_iter(line)
        .map(|m| {
            let start = line[..m.start()].chars().count();
            let end = start + m.as_str().chars().count();
            (Span { start, end }, m.as_str())
        })
        .collect()
}

/// Place every field of `line` under the header column it overlaps most,
/// or the closest one when it overlaps none. Columns without a field stay
/// empty.
fn slot_fields(columns: &[Span], line: &str) -> Vec<String> {
    let mut cells = vec![String::new(); columns.len()];
    for (field, text) in aligned_fields(line) {
        let Some((col, _)) = columns
            .iter()
            .enumerate()
            .min_by_key(|(_, column)| (Reverse(column.overlap(&field)), column.gap(&field)))
        else {
            continue;
        };
        let cell = &mut cells[col];
        if !cell.is_empty() {
            cell.push(' ');
        }
        cell.push_str(text);
    }
    cells
}
