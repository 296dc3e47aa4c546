//! Column role detection.
//!
//! Every decision here is a pure function over an immutable [`ColumnView`].
//! Energy columns are found by a fixed cascade of tiers (name keyword,
//! channel position, numeric density); a role filled by an earlier tier is
//! never revisited by a later one.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::text::parse_numeric;
use crate::sources::{RawRow, RawTable};

const TIMESTAMP_KEYWORDS: &[&str] = &["date", "time", "timestamp", "fecha", "hora", "datetime"];
pub const DATE_LIKE_THRESHOLD: f64 = 0.5;

/// `(keyword, weight)`; a column's rank is its heaviest match.
const PRIMARY_KEYWORDS: &[(&str, u32)] = &[
    ("kwh", 100),
    ("active energy", 80),
    ("energia activa", 80),
    ("energía activa", 80),
    ("active", 60),
    ("activa", 60),
];
const SECONDARY_KEYWORDS: &[(&str, u32)] = &[
    ("kvarh", 100),
    ("kvar", 90),
    ("reactive", 60),
    ("reactiva", 60),
];

/// Annotation columns that share labels with the energy channels.
const DECOY_KEYWORDS: &[&str] = &["scale", "factor", "escala", "status", "flag", "estado"];
const INDEX_NAMES: &[&str] = &["#", "no", "no.", "nº", "n°", "record", "rec", "registro", "index", "id", "item"];
const COMPANY_NAMES: &[&str] = &["company", "empresa"];

static DATE_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}|\d{4}-\d{1,2}-\d{1,2}|\d{1,2}[\s\-/.]+(?:de\s+)?(?:jan|ene|feb|mar|apr|abr|may|jun|jul|aug|ago|sep|set|oct|nov|dec|dic)\p{L}*\.?[\s\-/.,]+(?:de\s+)?\d{2,4}",
    )
    .expect("date-like pattern is valid")
});
static PRIMARY_CHANNEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:channel|canal|ch)\s*0?1\b").expect("channel pattern is valid"));
static SECONDARY_CHANNEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:channel|canal|ch)\s*0?2\b").expect("channel pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Timestamp,
    EnergyPrimary,
    EnergySecondary,
    Unclassified,
}

/// Read-only view over a subset of a table's rows.
#[derive(Debug, Clone)]
pub struct ColumnView<'a> {
    names: &'a [String],
    rows: Vec<&'a RawRow>,
}

impl<'a> ColumnView<'a> {
    pub fn new(names: &'a [String], rows: Vec<&'a RawRow>) -> Self {
        Self { names, rows }
    }

    pub fn of_table(table: &'a RawTable) -> Self {
        Self::new(&table.columns, table.rows.iter().collect())
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn name(&self, col: usize) -> &'a str {
        self.names.get(col).map(String::as_str).unwrap_or("")
    }

    pub fn rows(&self) -> &[&'a RawRow] {
        &self.rows
    }

    pub fn values(&self, col: usize) -> impl Iterator<Item = &'a str> + '_ {
        self.rows.iter().map(move |row| row.cell(col))
    }

    /// First `n` non-empty values of a column.
    pub fn sample(&self, col: usize, n: usize) -> Vec<&'a str> {
        self.values(col).filter(|v| !v.trim().is_empty()).take(n).collect()
    }
}

/// Ranked energy column candidates per role, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnergyCandidates {
    pub primary: Vec<usize>,
    pub secondary: Vec<usize>,
    pub primary_tier: Option<&'static str>,
    pub secondary_tier: Option<&'static str>,
}

impl EnergyCandidates {
    pub fn primary_column(&self) -> Option<usize> {
        self.primary.first().copied()
    }

    pub fn secondary_column(&self) -> Option<usize> {
        self.secondary.first().copied()
    }

    fn is_complete(&self) -> bool {
        !self.primary.is_empty() && !self.secondary.is_empty()
    }

    fn open(&self) -> OpenRoles {
        OpenRoles {
            primary: self.primary.is_empty(),
            secondary: self.secondary.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenRoles {
    primary: bool,
    secondary: bool,
}

type EnergyTier = fn(&ColumnView<'_>, &[usize], OpenRoles) -> (Vec<usize>, Vec<usize>);

const ENERGY_TIERS: [(&str, EnergyTier); 3] = [
    ("keyword", keyword_tier),
    ("channel", channel_tier),
    ("numeric", numeric_tier),
];

fn lower(name: &str) -> String {
    name.trim().to_lowercase()
}

fn contains_any(name: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| name.contains(k))
}

fn keyword_weight(name: &str, keywords: &[(&str, u32)]) -> Option<u32> {
    keywords.iter().filter(|(k, _)| name.contains(k)).map(|(_, w)| *w).max()
}

/// Whether a column label reads like a date or time heading.
pub(crate) fn is_timestamp_label(name: &str) -> bool {
    contains_any(&lower(name), TIMESTAMP_KEYWORDS)
}

/// Energy role a column label announces by unit keyword or channel
/// number. Reactive labels win over active ones.
pub(crate) fn energy_label_role(name: &str) -> Option<ColumnRole> {
    let lowered = lower(name);
    if keyword_weight(&lowered, SECONDARY_KEYWORDS).is_some() || SECONDARY_CHANNEL.is_match(name) {
        Some(ColumnRole::EnergySecondary)
    } else if keyword_weight(&lowered, PRIMARY_KEYWORDS).is_some() || PRIMARY_CHANNEL.is_match(name) {
        Some(ColumnRole::EnergyPrimary)
    } else {
        None
    }
}

/// Share of sampled non-empty values that look like a date.
pub fn date_like_ratio(view: &ColumnView<'_>, col: usize, sample_size: usize) -> f64 {
    let sample = view.sample(col, sample_size);
    if sample.is_empty() {
        return 0.0;
    }
    let hits = sample.iter().filter(|v| DATE_LIKE.is_match(v)).count();
    hits as f64 / sample.len() as f64
}

/// Share of all rows whose value parses as a number after cleaning.
pub fn numeric_density(view: &ColumnView<'_>, col: usize) -> f64 {
    if view.row_count() == 0 {
        return 0.0;
    }
    let numeric = view.values(col).filter(|v| parse_numeric(v).is_some()).count();
    numeric as f64 / view.row_count() as f64
}

/// Pick the timestamp column.
///
/// Columns named like a date or time win if any of their sampled values
/// look like dates (highest share first). Otherwise the column whose
/// sample looks most date-like is used, provided at least half of it does.
pub fn classify_timestamp(view: &ColumnView<'_>, sample_size: usize) -> Option<usize> {
    let ratios: Vec<f64> = (0..view.width())
        .map(|col| date_like_ratio(view, col, sample_size))
        .collect();
    let best_of = |cols: &mut dyn Iterator<Item = usize>| -> Option<usize> {
        cols.fold(None, |best: Option<usize>, col| match best {
            Some(b) if ratios[b] >= ratios[col] => Some(b),
            _ => Some(col),
        })
    };

    let mut named = (0..view.width())
        .filter(|&col| is_timestamp_label(view.name(col)) && ratios[col] > 0.0);
    if let Some(col) = best_of(&mut named) {
        return Some(col);
    }

    let mut all = 0..view.width();
    best_of(&mut all).filter(|&col| ratios[col] >= DATE_LIKE_THRESHOLD)
}

/// Find the column that names the company of each row, if the table
/// carries one (combined exports do).
pub fn company_column(view: &ColumnView<'_>) -> Option<usize> {
    (0..view.width()).find(|&col| COMPANY_NAMES.contains(&lower(view.name(col)).as_str()))
}

/// Columns that may carry energy values: everything except `excluded`,
/// row counters and status / scale-factor annotations.
pub fn value_columns(view: &ColumnView<'_>, excluded: &[usize]) -> Vec<usize> {
    (0..view.width())
        .filter(|col| !excluded.contains(col))
        .filter(|&col| {
            let name = lower(view.name(col));
            !INDEX_NAMES.contains(&name.as_str()) && !contains_any(&name, DECOY_KEYWORDS)
        })
        .collect()
}

fn ranked(mut scored: Vec<(usize, u32)>) -> Vec<usize> {
    // stable: equal weights keep column order
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(col, _)| col).collect()
}

fn keyword_tier(view: &ColumnView<'_>, eligible: &[usize], _open: OpenRoles) -> (Vec<usize>, Vec<usize>) {
    let mut primary = Vec::new();
    let mut secondary = Vec::new();
    for &col in eligible {
        let name = lower(view.name(col));
        if let Some(weight) = keyword_weight(&name, SECONDARY_KEYWORDS) {
            secondary.push((col, weight));
        } else if let Some(weight) = keyword_weight(&name, PRIMARY_KEYWORDS) {
            primary.push((col, weight));
        }
    }
    (ranked(primary), ranked(secondary))
}

fn channel_tier(view: &ColumnView<'_>, eligible: &[usize], _open: OpenRoles) -> (Vec<usize>, Vec<usize>) {
    let primary = eligible
        .iter()
        .copied()
        .filter(|&col| PRIMARY_CHANNEL.is_match(view.name(col)))
        .collect();
    let secondary = eligible
        .iter()
        .copied()
        .filter(|&col| SECONDARY_CHANNEL.is_match(view.name(col)))
        .collect();
    (primary, secondary)
}

fn numeric_tier(view: &ColumnView<'_>, eligible: &[usize], open: OpenRoles) -> (Vec<usize>, Vec<usize>) {
    let mut scored: Vec<(usize, f64)> = eligible
        .iter()
        .map(|&col| (col, numeric_density(view, col)))
        .filter(|(_, density)| *density > 0.0)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut ranked = scored.into_iter().map(|(col, _)| col);

    let primary: Vec<usize> = if open.primary { ranked.next().into_iter().collect() } else { Vec::new() };
    let secondary: Vec<usize> = if open.secondary { ranked.next().into_iter().collect() } else { Vec::new() };
    (primary, secondary)
}

/// Run the energy tiers over `eligible` columns until both roles are
/// filled or the tiers run out.
pub fn classify_energy(view: &ColumnView<'_>, eligible: &[usize]) -> EnergyCandidates {
    let mut found = EnergyCandidates::default();

    for (tier_name, tier) in ENERGY_TIERS {
        if found.is_complete() {
            break;
        }
        let taken: Vec<usize> = found.primary.iter().chain(&found.secondary).copied().collect();
        let remaining: Vec<usize> = eligible.iter().copied().filter(|c| !taken.contains(c)).collect();

        let open = found.open();
        let (primary, secondary) = tier(view, &remaining, open);
        if open.primary && !primary.is_empty() {
            found.primary = primary;
            found.primary_tier = Some(tier_name);
        }
        if open.secondary && !secondary.is_empty() {
            found.secondary = secondary;
            found.secondary_tier = Some(tier_name);
        }
    }

    found
}

/// Role of every column, for diagnostics.
pub fn column_roles(width: usize, timestamp: Option<usize>, energy: &EnergyCandidates) -> Vec<ColumnRole> {
    (0..width)
        .map(|col| {
            if Some(col) == timestamp {
                ColumnRole::Timestamp
            } else if energy.primary.contains(&col) {
                ColumnRole::EnergyPrimary
            } else if energy.secondary.contains(&col) {
                ColumnRole::EnergySecondary
            } else {
                ColumnRole::Unclassified
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .enumerate()
                .map(|(line, cells)| RawRow {
                    line,
                    cells: cells.iter().map(|c| c.to_string()).collect(),
                })
                .collect(),
        }
    }

    fn energy_of(t: &RawTable, ts: usize) -> EnergyCandidates {
        let view = ColumnView::of_table(t);
        let eligible = value_columns(&view, &[ts]);
        classify_energy(&view, &eligible)
    }

    #[test]
    fn timestamp_by_name_then_by_content() {
        let named = table(
            &["Record", "ReadDateTime", "kWh"],
            &[&["1", "01/02/2024 00:00", "1"], &["2", "01/02/2024 00:15", "2"]],
        );
        assert_eq!(classify_timestamp(&ColumnView::of_table(&named), 20), Some(1));

        let unnamed = table(
            &["A", "B", "C"],
            &[&["x", "1", "2024-02-01 00:00"], &["y", "2", "2024-02-01 00:15"]],
        );
        assert_eq!(classify_timestamp(&ColumnView::of_table(&unnamed), 20), Some(2));
    }

    #[test]
    fn month_name_dates_look_like_dates() {
        let t = table(
            &["Lectura", "kWh"],
            &[&["01-Feb-2024 00:15", "1"], &["1 feb 2024 00:30", "2"], &["02-ene-24 12:15 a. m.", "3"]],
        );
        let view = ColumnView::of_table(&t);
        assert_eq!(date_like_ratio(&view, 0, 20), 1.0);
        assert_eq!(classify_timestamp(&view, 20), Some(0));
    }

    #[test]
    fn named_column_without_dates_is_not_trusted() {
        let t = table(
            &["Time Zone", "Lectura", "kWh"],
            &[&["UTC-5", "01/02/2024 00:00", "1"], &["UTC-5", "01/02/2024 00:15", "2"]],
        );
        assert_eq!(classify_timestamp(&ColumnView::of_table(&t), 20), Some(1));
    }

    #[test]
    fn no_timestamp_when_content_is_not_date_like() {
        let t = table(&["A", "B", "C", "D"], &[&["1", "2", "3", "x"], &["4", "5", "6", "01/02/2024"]]);
        // Half of D is date-like, which is enough.
        assert_eq!(classify_timestamp(&ColumnView::of_table(&t), 20), Some(3));

        let t = table(&["A", "B"], &[&["1", "2"], &["4", "5"]]);
        assert_eq!(classify_timestamp(&ColumnView::of_table(&t), 20), None);
    }

    #[test]
    fn keyword_tier_ranks_and_keeps_reactive_out_of_primary() {
        let t = table(
            &["Fecha", "Reactive Energy", "Active Energy", "kWh Del", "kvarh"],
            &[&["01/02/2024 00:00", "1", "2", "3", "4"]],
        );
        let energy = energy_of(&t, 0);
        assert_eq!(energy.primary, vec![3, 2]);
        assert_eq!(energy.secondary, vec![4, 1]);
        assert_eq!(energy.primary_tier, Some("keyword"));
    }

    #[test]
    fn channel_tier_skips_scale_and_status_columns() {
        let t = table(
            &["ReadDateTime", "Channel 1", "Channel 2", "Channel 1 Scale Factor", "Status Flags"],
            &[&["01/02/2024 00:00", "1", "2", "1", "0"]],
        );
        let energy = energy_of(&t, 0);
        assert_eq!(energy.primary, vec![1]);
        assert_eq!(energy.secondary, vec![2]);
        assert_eq!(energy.secondary_tier, Some("channel"));
    }

    #[test]
    fn channel_ten_is_not_channel_one() {
        let t = table(&["ts", "Channel 10", "Ch 02"], &[&["01/02/2024 00:00", "1", "2"]]);
        let energy = energy_of(&t, 0);
        assert_eq!(energy.secondary, vec![2]);
        assert_eq!(energy.secondary_tier, Some("channel"));
        // Channel 10 is left for the numeric tier.
        assert_eq!(energy.primary, vec![1]);
        assert_eq!(energy.primary_tier, Some("numeric"));
    }

    #[test]
    fn numeric_tier_fills_open_roles_by_density_then_order() {
        let t = table(
            &["Date", "Record", "A", "B", "C"],
            &[
                &["01/02/2024 00:00", "1", "x", "1,5", "2"],
                &["01/02/2024 00:15", "2", "3", "", "4"],
            ],
        );
        let energy = energy_of(&t, 0);
        // C is fully numeric; A and B tie at one half, A first.
        assert_eq!(energy.primary, vec![4]);
        assert_eq!(energy.secondary, vec![2]);
    }

    #[test]
    fn numeric_tier_only_fills_the_missing_role() {
        let t = table(
            &["Date", "kWh", "Other"],
            &[&["01/02/2024 00:00", "1", "7"]],
        );
        let energy = energy_of(&t, 0);
        assert_eq!(energy.primary, vec![1]);
        assert_eq!(energy.primary_tier, Some("keyword"));
        assert_eq!(energy.secondary, vec![2]);
        assert_eq!(energy.secondary_tier, Some("numeric"));
    }

    #[test]
    fn roles_and_company_column() {
        let t = table(&["company", "timestamp", "kwh", "kvarh"], &[&["a", "2024-02-01 00:00:00", "1", ""]]);
        let view = ColumnView::of_table(&t);
        assert_eq!(company_column(&view), Some(0));
        let energy = classify_energy(&view, &value_columns(&view, &[0, 1]));
        assert_eq!(
            column_roles(4, Some(1), &energy),
            vec![
                ColumnRole::Unclassified,
                ColumnRole::Timestamp,
                ColumnRole::EnergyPrimary,
                ColumnRole::EnergySecondary
            ]
        );
    }

    #[test]
    fn label_roles() {
        assert!(is_timestamp_label("Hora"));
        assert!(!is_timestamp_label("kWh"));
        assert_eq!(energy_label_role("kWh"), Some(ColumnRole::EnergyPrimary));
        assert_eq!(energy_label_role("Energia Reactiva"), Some(ColumnRole::EnergySecondary));
        assert_eq!(energy_label_role("Channel 2"), Some(ColumnRole::EnergySecondary));
        assert_eq!(energy_label_role("Quality"), None);
    }

    #[test]
    fn densities() {
        let t = table(&["v"], &[&["1"], &["n/a"], &["2,5"], &[""]]);
        let view = ColumnView::of_table(&t);
        assert_eq!(numeric_density(&view, 0), 0.5);
        assert_eq!(date_like_ratio(&view, 0, 20), 0.0);
    }
}
