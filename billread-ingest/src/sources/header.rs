//! Locates the real column header below a free-form preamble.
//!
//! Meter exports start with banner lines, meter metadata and sometimes a
//! "scale factor" row that repeats the channel labels. Every sufficiently
//! wide line is scored and the best one wins.

use super::SourceFormat;
use crate::transform::classify::{energy_label_role, is_timestamp_label, ColumnRole};

pub const HEADER_SCAN_LINES: usize = 200;
pub const MIN_HEADER_FIELDS: usize = 4;

const STATUS_LABELS: &[&str] = &["status", "flag", "estado", "quality", "calidad"];
const SCALE_FACTOR_MARKER: &str = "scale factor";
const LOOKBACK_LINES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct LineFeatures {
    timestamp: bool,
    primary: bool,
    secondary: bool,
    status: bool,
    scale_factor: bool,
}

impl LineFeatures {
    fn of(line: &str, format: SourceFormat) -> Self {
        let mut features = Self {
            scale_factor: line.to_lowercase().contains(SCALE_FACTOR_MARKER),
            ..Self::default()
        };
        for field in format.split_fields(line) {
            let lower = field.to_lowercase();
            features.timestamp |= is_timestamp_label(field);
            features.status |= STATUS_LABELS.iter().any(|l| lower.contains(l));
            match energy_label_role(field) {
                Some(ColumnRole::EnergyPrimary) => features.primary = true,
                Some(ColumnRole::EnergySecondary) => features.secondary = true,
                _ => {}
            }
        }
        features
    }

    fn channels(&self) -> usize {
        usize::from(self.primary) + usize::from(self.secondary)
    }

    fn score(&self) -> i32 {
        let mut score = 0;
        if self.timestamp {
            score += 3;
        }
        score += 2 * self.channels() as i32;
        if self.status {
            score += 1;
        }
        if self.scale_factor {
            score -= 4;
        }
        if self.channels() == 2 && !self.scale_factor {
            score += 6;
        }
        score
    }

    fn is_clean_header(&self) -> bool {
        self.timestamp && self.channels() == 2 && !self.scale_factor
    }
}

/// Score a candidate header line; `None` when it has fewer than
/// `min_fields` fields.
pub fn header_score(line: &str, format: SourceFormat, min_fields: usize) -> Option<i32> {
    (format.field_count(line) >= min_fields).then(|| LineFeatures::of(line, format).score())
}

/// Zero-based offset of the header line among `lines`.
///
/// The highest score wins, earliest line on ties. If the winner still
/// carries the scale-factor marker, up to five preceding lines are searched
/// for a clean header with the timestamp and both channel labels; that
/// lookback ignores the field count. Otherwise lines with fewer than
/// `min_fields` fields never qualify, and with no qualifying line the
/// offset is 0.
pub fn locate_header<S: AsRef<str>>(lines: &[S], format: SourceFormat, min_fields: usize) -> usize {
    let mut best: Option<(usize, i32)> = None;
    for (idx, line) in lines.iter().enumerate() {
        if let Some(score) = header_score(line.as_ref(), format, min_fields) {
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((idx, score));
            }
        }
    }

    let Some((idx, _)) = best else {
        return 0;
    };

    if !LineFeatures::of(lines[idx].as_ref(), format).scale_factor {
        return idx;
    }

    (idx.saturating_sub(LOOKBACK_LINES)..idx)
        .rev()
        .find(|&i| LineFeatures::of(lines[i].as_ref(), format).is_clean_header())
        .unwrap_or(idx)
}
