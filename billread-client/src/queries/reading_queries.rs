use std::collections::BTreeMap;

use time::{Duration, PrimitiveDateTime, Time};

use crate::domain::{CombinedDataset, GridReading};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CompanyTotals {
    pub company: String,
    pub total_kwh: Option<f64>,
    pub total_kvarh: Option<f64>,
    pub readings: usize,
}

/// Time-ordered load profile for a single company over `[start, end)`.
pub fn load_profile<'a>(
    dataset: &'a CombinedDataset,
    company: &str,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Vec<&'a GridReading> {
    dataset
        .rows()
        .iter()
        .filter(|r| r.company == company && r.ts >= start && r.ts < end)
        .collect()
}

fn floor_to_hour(ts: PrimitiveDateTime) -> PrimitiveDateTime {
    ts.replace_time(Time::MIDNIGHT + Duration::hours(i64::from(ts.hour())))
}

/// Present values are added; an empty bucket stays empty.
fn add_present(acc: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a + v),
        (None, v) => v,
        (a, None) => a,
    }
}

/// Re-sample a dataset to one row per `(company, hour)`, summing the
/// readings that fall into each hour.
pub fn hourly_rollup(dataset: &CombinedDataset) -> CombinedDataset {
    let mut buckets: BTreeMap<(String, PrimitiveDateTime), (Option<f64>, Option<f64>)> =
        BTreeMap::new();

    for row in dataset.rows() {
        let entry = buckets
            .entry((row.company.clone(), floor_to_hour(row.ts)))
            .or_insert((None, None));
        entry.0 = add_present(entry.0, row.kwh);
        entry.1 = add_present(entry.1, row.kvarh);
    }

    let rows = buckets
        .into_iter()
        .map(|((company, ts), (kwh, kvarh))| GridReading {
            company,
            ts,
            kwh,
            kvarh,
        })
        .collect();
    CombinedDataset::from_rows(rows)
}

/// Sum both channels per company.
pub fn company_totals(dataset: &CombinedDataset) -> Vec<CompanyTotals> {
    let mut out: Vec<CompanyTotals> = Vec::new();
    for row in dataset.rows() {
        if out.last().map(|t| t.company != row.company).unwrap_or(true) {
            out.push(CompanyTotals {
                company: row.company.clone(),
                total_kwh: None,
                total_kvarh: None,
                readings: 0,
            });
        }
        if let Some(totals) = out.last_mut() {
            totals.total_kwh = add_present(totals.total_kwh, row.kwh);
            totals.total_kvarh = add_present(totals.total_kvarh, row.kvarh);
            if !row.is_empty() {
                totals.readings += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn reading(company: &str, ts: PrimitiveDateTime, kwh: Option<f64>, kvarh: Option<f64>) -> GridReading {
        GridReading {
            company: company.to_string(),
            ts,
            kwh,
            kvarh,
        }
    }

    #[test]
    fn load_profile_is_half_open_and_company_scoped() {
        let ds = CombinedDataset::from_rows(vec![
            reading("a", datetime!(2024-03-01 00:00), Some(1.0), None),
            reading("a", datetime!(2024-03-01 00:15), Some(2.0), None),
            reading("b", datetime!(2024-03-01 00:00), Some(3.0), None),
        ]);

        let profile = load_profile(&ds, "a", datetime!(2024-03-01 00:00), datetime!(2024-03-01 00:15));
        assert_eq!(profile.len(), 1);
        assert_eq!(profile[0].kwh, Some(1.0));
    }

    #[test]
    fn hourly_rollup_sums_present_values_and_keeps_empty_hours_absent() {
        let ds = CombinedDataset::from_rows(vec![
            reading("a", datetime!(2024-03-01 00:00), Some(1.0), None),
            reading("a", datetime!(2024-03-01 00:15), None, Some(0.5)),
            reading("a", datetime!(2024-03-01 00:45), Some(2.5), Some(0.25)),
            reading("a", datetime!(2024-03-01 01:00), None, None),
        ]);

        let hourly = hourly_rollup(&ds);
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly.rows()[0].ts, datetime!(2024-03-01 00:00));
        assert_eq!(hourly.rows()[0].kwh, Some(3.5));
        assert_eq!(hourly.rows()[0].kvarh, Some(0.75));
        assert_eq!(hourly.rows()[1].kwh, None);
        assert_eq!(hourly.rows()[1].kvarh, None);
    }

    #[test]
    fn company_totals_groups_in_dataset_order() {
        let ds = CombinedDataset::from_rows(vec![
            reading("b", datetime!(2024-03-01 00:00), Some(1.0), None),
            reading("a", datetime!(2024-03-01 00:00), None, None),
            reading("b", datetime!(2024-03-01 00:15), Some(4.0), Some(1.0)),
        ]);

        let totals = company_totals(&ds);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].company, "a");
        assert_eq!(totals[0].total_kwh, None);
        assert_eq!(totals[0].readings, 0);
        assert_eq!(totals[1].total_kwh, Some(5.0));
        assert_eq!(totals[1].total_kvarh, Some(1.0));
        assert_eq!(totals[1].readings, 2);
    }
}
