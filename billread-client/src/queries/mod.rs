mod reading_queries;

pub use reading_queries::{company_totals, hourly_rollup, load_profile, CompanyTotals};
