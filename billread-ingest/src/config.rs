use serde::Deserialize;
use std::{fs, path::Path};

use crate::analyzer::{DEFAULT_END_TIME, DEFAULT_START_TIME};
use crate::pipeline::IngestSettings;
use crate::sources::{LoadOptions, SourceEncoding};
use crate::transform::grid::{parse_clock, VALID_INTERVALS};

const CONFIG_ENV: &str = "BILLREAD_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "billread.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    pub encodings: Vec<SourceEncoding>,
    pub header_scan_lines: usize,
    pub min_header_fields: usize,
    pub timestamp_sample_size: usize,
    pub numeric_density_threshold: f64,
    pub default_interval_minutes: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let settings = IngestSettings::default();
        Self {
            encodings: settings.load.encodings,
            header_scan_lines: settings.load.header_scan_lines,
            min_header_fields: settings.load.min_header_fields,
            timestamp_sample_size: settings.timestamp_sample_size,
            numeric_density_threshold: settings.numeric_density_threshold,
            default_interval_minutes: settings.default_interval_minutes,
        }
    }
}

impl IngestConfig {
    pub fn settings(&self) -> IngestSettings {
        IngestSettings {
            load: LoadOptions {
                encodings: self.encodings.clone(),
                header_scan_lines: self.header_scan_lines,
                min_header_fields: self.min_header_fields,
            },
            timestamp_sample_size: self.timestamp_sample_size,
            numeric_density_threshold: self.numeric_density_threshold,
            default_interval_minutes: self.default_interval_minutes,
        }
    }
}

/// Default time-of-day markers for the month grid.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PeriodConfig {
    pub start_time: String,
    pub end_time: String,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            start_time: DEFAULT_START_TIME.to_string(),
            end_time: DEFAULT_END_TIME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Prometheus exposition text is written here after each run.
    pub textfile_path: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub ingest: IngestConfig,
    pub period: PeriodConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load from `$BILLREAD_CONFIG`, else `./billread.toml` when present,
    /// else the built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE)),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let ingest = &self.ingest;
        if ingest.encodings.is_empty() {
            anyhow::bail!("[ingest] encodings must not be empty");
        }
        if ingest.min_header_fields == 0 || ingest.header_scan_lines == 0 || ingest.timestamp_sample_size == 0 {
            anyhow::bail!("[ingest] header_scan_lines, min_header_fields and timestamp_sample_size must be positive");
        }
        if !(ingest.numeric_density_threshold > 0.0 && ingest.numeric_density_threshold <= 1.0) {
            anyhow::bail!(
                "[ingest] numeric_density_threshold must be in (0, 1], got {}",
                ingest.numeric_density_threshold
            );
        }
        if !VALID_INTERVALS.contains(&ingest.default_interval_minutes) {
            anyhow::bail!(
                "[ingest] default_interval_minutes must be one of {:?}, got {}",
                VALID_INTERVALS,
                ingest.default_interval_minutes
            );
        }
        for (key, value) in [("start_time", &self.period.start_time), ("end_time", &self.period.end_time)] {
            if parse_clock(value).is_none() {
                anyhow::bail!("[period] {key} must be HH:MM, got '{value}'");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.ingest.settings(), IngestSettings::default());
        assert_eq!(cfg.period.end_time, "00:15");
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [ingest]
            encodings = ["cp1252", "utf-8"]
            default_interval_minutes = 5

            [period]
            start_time = "06:00"

            [metrics]
            textfile_path = "/var/lib/node_exporter/billread.prom"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.ingest.encodings, vec![SourceEncoding::Windows1252, SourceEncoding::Utf8Sig]);
        assert_eq!(cfg.ingest.header_scan_lines, 200);
        assert_eq!(cfg.ingest.settings().default_interval_minutes, 5);
        assert_eq!(cfg.period.start_time, "06:00");
        assert_eq!(cfg.period.end_time, "00:15");
        assert!(cfg.metrics.is_some());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(AppConfig::from_toml_str("[ingest]\nencodings = [\"ebcdic\"]").is_err());
        assert!(AppConfig::from_toml_str("[ingest]\ndefault_interval_minutes = 7").is_err());
        assert!(AppConfig::from_toml_str("[ingest]\nnumeric_density_threshold = 0.0").is_err());
        assert!(AppConfig::from_toml_str("[period]\nend_time = \"24:00\"").is_err());
    }
}
