use time::PrimitiveDateTime;

use super::GridReading;

/// All company reading sets of one analysis run, ordered by
/// `(company, ts)`.
///
/// The ordering is established on construction; the type hands out shared
/// slices only, so readers never see a partially merged dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedDataset {
    rows: Vec<GridReading>,
}

impl CombinedDataset {
    pub fn from_rows(mut rows: Vec<GridReading>) -> Self {
        rows.sort_by(|a, b| a.company.cmp(&b.company).then(a.ts.cmp(&b.ts)));
        Self { rows }
    }

    /// Concatenate per-file reading sets into one dataset.
    pub fn concat<I>(sets: I) -> Self
    where
        I: IntoIterator<Item = Vec<GridReading>>,
    {
        Self::from_rows(sets.into_iter().flatten().collect())
    }

    pub fn rows(&self) -> &[GridReading] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Earliest and latest timestamp across every company.
    pub fn bounds(&self) -> Option<(PrimitiveDateTime, PrimitiveDateTime)> {
        let min = self.rows.iter().map(|r| r.ts).min()?;
        let max = self.rows.iter().map(|r| r.ts).max()?;
        Some((min, max))
    }

    pub fn kwh_values(&self) -> usize {
        self.rows.iter().filter(|r| r.kwh.is_some()).count()
    }

    pub fn kvarh_values(&self) -> usize {
        self.rows.iter().filter(|r| r.kvarh.is_some()).count()
    }

    /// Distinct company identifiers in dataset order.
    pub fn companies(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for row in &self.rows {
            if out.last() != Some(&row.company.as_str()) {
                out.push(&row.company);
            }
        }
        out
    }

    /// Collapse rows sharing `(company, ts)` into one, keeping the first
    /// present value of each channel.
    pub fn merge_duplicates(mut self) -> Self {
        self.rows.dedup_by(|later, kept| {
            if later.company != kept.company || later.ts != kept.ts {
                return false;
            }
            kept.kwh = kept.kwh.or(later.kwh);
            kept.kvarh = kept.kvarh.or(later.kvarh);
            true
        });
        self
    }

    /// Keep only rows with `start <= ts <= end`.
    pub fn retain_between(mut self, start: PrimitiveDateTime, end: PrimitiveDateTime) -> Self {
        self.rows.retain(|r| r.ts >= start && r.ts <= end);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn reading(company: &str, ts: PrimitiveDateTime, kwh: Option<f64>) -> GridReading {
        GridReading {
            company: company.to_string(),
            ts,
            kwh,
            kvarh: None,
        }
    }

    #[test]
    fn concat_sorts_by_company_then_timestamp() {
        let a = vec![
            reading("beta", datetime!(2024-01-01 00:15), Some(1.0)),
            reading("beta", datetime!(2024-01-01 00:00), Some(2.0)),
        ];
        let b = vec![reading("alpha", datetime!(2024-01-01 00:30), None)];

        let ds = CombinedDataset::concat(vec![a, b]);
        let keys: Vec<_> = ds.rows().iter().map(|r| (r.company.as_str(), r.ts)).collect();
        assert_eq!(
            keys,
            vec![
                ("alpha", datetime!(2024-01-01 00:30)),
                ("beta", datetime!(2024-01-01 00:00)),
                ("beta", datetime!(2024-01-01 00:15)),
            ]
        );
        assert_eq!(ds.companies(), vec!["alpha", "beta"]);
    }

    #[test]
    fn value_counts_ignore_absent_readings() {
        let ds = CombinedDataset::from_rows(vec![
            reading("a", datetime!(2024-01-01 00:00), Some(0.0)),
            reading("a", datetime!(2024-01-01 00:15), None),
        ]);
        assert_eq!(ds.kwh_values(), 1);
        assert_eq!(ds.kvarh_values(), 0);
        assert_eq!(
            ds.bounds(),
            Some((datetime!(2024-01-01 00:00), datetime!(2024-01-01 00:15)))
        );
    }

    #[test]
    fn retain_between_is_inclusive() {
        let ds = CombinedDataset::from_rows(vec![
            reading("a", datetime!(2024-01-01 00:00), None),
            reading("a", datetime!(2024-01-01 00:15), None),
            reading("a", datetime!(2024-01-01 00:30), None),
        ])
        .retain_between(datetime!(2024-01-01 00:15), datetime!(2024-01-01 00:30));
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn duplicates_keep_first_present_value() {
        let ds = CombinedDataset::from_rows(vec![
            reading("a", datetime!(2024-02-01 00:00), None),
            reading("a", datetime!(2024-02-01 00:00), Some(4.0)),
            reading("a", datetime!(2024-02-01 00:15), Some(1.0)),
            reading("b", datetime!(2024-02-01 00:15), Some(2.0)),
        ])
        .merge_duplicates();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.rows()[0].kwh, Some(4.0));
        assert_eq!(ds.rows()[2].company, "b");
    }
}
