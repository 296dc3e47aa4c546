//! Pure per-file transforms: text cleanup, timestamp parsing, column
//! classification, interval inference and grid projection.

pub mod aggregate;
pub mod classify;
pub mod grid;
pub mod text;
pub mod timestamp;

pub use aggregate::{aggregate_energy, reindex, EnergyTable};
pub use classify::{classify_energy, classify_timestamp, ColumnRole, ColumnView, EnergyCandidates};
pub use grid::{infer_interval_minutes, parse_clock, MonthPeriod, TimeGrid};
pub use text::{normalize_am_pm, parse_numeric};
pub use timestamp::parse_timestamp;
