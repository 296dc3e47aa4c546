//! Energy consolidation and re-projection onto the grid.

use std::collections::BTreeMap;

use billread_client::GridReading;
use time::PrimitiveDateTime;

use super::classify::{ColumnView, EnergyCandidates};
use super::grid::TimeGrid;
use super::text::parse_numeric;

/// One role's consolidated readings, keyed by instant.
pub type RoleSeries = BTreeMap<PrimitiveDateTime, f64>;

/// Per-file energy readings after consolidation, before reindexing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnergyTable {
    pub kwh: RoleSeries,
    pub kvarh: RoleSeries,
    pub kwh_columns: Vec<usize>,
    pub kvarh_columns: Vec<usize>,
    /// Set when the candidate lists produced nothing and columns were
    /// picked by valid-value count instead.
    pub used_fallback: bool,
}

/// Stack every candidate column and keep the largest present value per
/// instant. `timestamps[i]` is the instant of `view.rows()[i]`.
pub fn consolidate(view: &ColumnView<'_>, timestamps: &[PrimitiveDateTime], columns: &[usize]) -> RoleSeries {
    let mut series = RoleSeries::new();
    for &col in columns {
        for (ts, raw) in timestamps.iter().zip(view.values(col)) {
            let Some(value) = parse_numeric(raw) else {
                continue;
            };
            series
                .entry(*ts)
                .and_modify(|current| *current = current.max(value))
                .or_insert(value);
        }
    }
    series
}

fn valid_count(view: &ColumnView<'_>, col: usize) -> usize {
    view.values(col).filter(|v| parse_numeric(v).is_some()).count()
}

/// Eligible columns whose numeric density reaches `threshold`, with their
/// valid-value counts, in column order.
fn dense_columns(view: &ColumnView<'_>, eligible: &[usize], threshold: f64) -> Vec<(usize, usize)> {
    let rows = view.row_count();
    if rows == 0 {
        return Vec::new();
    }
    eligible
        .iter()
        .map(|&col| (col, valid_count(view, col)))
        .filter(|&(_, count)| count > 0 && count as f64 / rows as f64 >= threshold)
        .collect()
}

/// The pair of distinct dense columns with the most valid values between
/// them. The earlier pair wins a tie.
pub fn best_pair(view: &ColumnView<'_>, eligible: &[usize], threshold: f64) -> Option<(usize, usize)> {
    let dense = dense_columns(view, eligible, threshold);
    let mut best: Option<((usize, usize), usize)> = None;
    for (i, &(a, count_a)) in dense.iter().enumerate() {
        for &(b, count_b) in &dense[i + 1..] {
            let total = count_a + count_b;
            if best.map_or(true, |(_, best_total)| total > best_total) {
                best = Some(((a, b), total));
            }
        }
    }
    best.map(|(pair, _)| pair)
}

/// The dense column with the most valid values, skipping `taken`.
pub fn best_single(view: &ColumnView<'_>, eligible: &[usize], taken: &[usize], threshold: f64) -> Option<usize> {
    dense_columns(view, eligible, threshold)
        .into_iter()
        .filter(|(col, _)| !taken.contains(col))
        .fold(None::<(usize, usize)>, |best, (col, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((col, count)),
        })
        .map(|(col, _)| col)
}

/// Build the per-file energy table from the classifier's candidates,
/// falling back to a density-qualified column search for any role whose
/// candidates yield no values.
pub fn aggregate_energy(
    view: &ColumnView<'_>,
    timestamps: &[PrimitiveDateTime],
    candidates: &EnergyCandidates,
    eligible: &[usize],
    density_threshold: f64,
) -> EnergyTable {
    let mut table = EnergyTable {
        kwh: consolidate(view, timestamps, &candidates.primary),
        kvarh: consolidate(view, timestamps, &candidates.secondary),
        kwh_columns: candidates.primary.clone(),
        kvarh_columns: candidates.secondary.clone(),
        used_fallback: false,
    };

    match (table.kwh.is_empty(), table.kvarh.is_empty()) {
        (true, true) => {
            if let Some((primary, secondary)) = best_pair(view, eligible, density_threshold) {
                table.kwh = consolidate(view, timestamps, &[primary]);
                table.kvarh = consolidate(view, timestamps, &[secondary]);
                table.kwh_columns = vec![primary];
                table.kvarh_columns = vec![secondary];
                table.used_fallback = true;
            }
        }
        (true, false) => {
            if let Some(col) = best_single(view, eligible, &table.kvarh_columns, density_threshold) {
                table.kwh = consolidate(view, timestamps, &[col]);
                table.kwh_columns = vec![col];
                table.used_fallback = true;
            }
        }
        (false, true) => {
            if let Some(col) = best_single(view, eligible, &table.kwh_columns, density_threshold) {
                table.kvarh = consolidate(view, timestamps, &[col]);
                table.kvarh_columns = vec![col];
                table.used_fallback = true;
            }
        }
        (false, false) => {}
    }

    table
}

/// Project the energy table onto `grid`. Grid instants without a source
/// reading stay absent; source instants off the grid are dropped.
pub fn reindex(grid: &TimeGrid, energy: &EnergyTable, company: &str) -> Vec<GridReading> {
    grid.points()
        .iter()
        .map(|ts| GridReading {
            company: company.to_string(),
            ts: *ts,
            kwh: energy.kwh.get(ts).copied(),
            kvarh: energy.kvarh.get(ts).copied(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{RawRow, RawTable};
    use crate::transform::grid::MonthPeriod;
    use time::macros::{datetime, time};

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

    #[test]
    fn overlapping_candidates_take_the_maximum() {
        let t = table(
            &["kWh A", "kWh B"],
            &[&["1,5", "2"], &["4", "3"], &["", "7"], &["x", ""]],
        );
        let view = ColumnView::of_table(&t);
        let ts = [
            datetime!(2024-02-01 00:00),
            datetime!(2024-02-01 00:15),
            datetime!(2024-02-01 00:30),
            datetime!(2024-02-01 00:45),
        ];
        let series = consolidate(&view, &ts, &[0, 1]);
        assert_eq!(series.get(&ts[0]), Some(&2.0));
        assert_eq!(series.get(&ts[1]), Some(&4.0));
        assert_eq!(series.get(&ts[2]), Some(&7.0));
        assert_eq!(series.get(&ts[3]), None);
    }

    #[test]
    fn duplicate_instants_keep_the_maximum() {
        let t = table(&["kWh"], &[&["5"], &["3"]]);
        let view = ColumnView::of_table(&t);
        let ts = [datetime!(2024-02-01 00:00), datetime!(2024-02-01 00:00)];
        let series = consolidate(&view, &ts, &[0]);
        assert_eq!(series.len(), 1);
        assert_eq!(series.get(&ts[0]), Some(&5.0));
    }

    #[test]
    fn reindex_never_fabricates_zero() {
        let period = MonthPeriod::new(2024, 2, time!(00:00), time!(00:15)).unwrap();
        let grid = TimeGrid::for_month(&period, 15);
        let mut energy = EnergyTable::default();
        energy.kwh.insert(datetime!(2024-02-01 00:15), 0.0);
        energy.kwh.insert(datetime!(2024-02-01 00:07), 9.0);
        energy.kvarh.insert(datetime!(2024-02-10 12:00), 1.25);

        let rows = reindex(&grid, &energy, "acme");
        assert_eq!(rows.len(), 2784);
        assert!(rows.iter().all(|r| r.company == "acme"));
        assert_eq!(rows[0].kwh, None);
        assert_eq!(rows[1].kwh, Some(0.0));
        assert_eq!(rows.iter().filter(|r| r.kwh.is_some()).count(), 1);
        assert_eq!(rows.iter().filter(|r| r.kvarh.is_some()).count(), 1);
    }

    #[test]
    fn empty_candidates_fall_back_to_best_pair() {
        let t = table(
            &["kWh", "A", "B", "C"],
            &[&["--", "1", "2", ""], &["--", "3", "", "5"], &["--", "4", "6", "7"]],
        );
        let view = ColumnView::of_table(&t);
        let ts = [
            datetime!(2024-02-01 00:00),
            datetime!(2024-02-01 00:15),
            datetime!(2024-02-01 00:30),
        ];
        let candidates = EnergyCandidates {
            primary: vec![0],
            ..EnergyCandidates::default()
        };
        let energy = aggregate_energy(&view, &ts, &candidates, &[0, 1, 2, 3], 0.5);
        assert!(energy.used_fallback);
        // A has three values; B and C tie at two, B comes first.
        assert_eq!(energy.kwh_columns, vec![1]);
        assert_eq!(energy.kvarh_columns, vec![2]);
        assert_eq!(energy.kvarh.get(&ts[2]), Some(&6.0));
    }

    #[test]
    fn one_empty_role_is_filled_by_best_single() {
        let t = table(&["kWh", "kvarh", "Other"], &[&["1", "-", "8"], &["2", "-", "9"]]);
        let view = ColumnView::of_table(&t);
        let ts = [datetime!(2024-02-01 00:00), datetime!(2024-02-01 00:15)];
        let candidates = EnergyCandidates {
            primary: vec![0],
            secondary: vec![1],
            ..EnergyCandidates::default()
        };
        let energy = aggregate_energy(&view, &ts, &candidates, &[0, 1, 2], 0.5);
        assert_eq!(energy.kwh_columns, vec![0]);
        assert_eq!(energy.kvarh_columns, vec![2]);
        assert_eq!(energy.kvarh.get(&ts[1]), Some(&9.0));
    }

    #[test]
    fn sparse_columns_do_not_qualify_for_fallback() {
        let t = table(&["A", "B"], &[&["1", ""], &["", ""], &["", "2"]]);
        let view = ColumnView::of_table(&t);
        assert_eq!(best_pair(&view, &[0, 1], 0.5), None);
        assert_eq!(best_single(&view, &[0, 1], &[], 0.3), Some(0));
    }
}
