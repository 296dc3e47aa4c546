//! Prometheus exposition without a listener: the recorder is installed for
//! the lifetime of the process and its rendered text is dumped to a file
//! that a node-exporter textfile collector picks up.

use std::{fs, path::Path};

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder once; later calls are no-ops.
pub fn init() -> anyhow::Result<()> {
    PROM_HANDLE
        .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
        .context("failed to install Prometheus metrics recorder")?;
    Ok(())
}

/// Current exposition text, if the recorder is installed.
pub fn render() -> Option<String> {
    PROM_HANDLE.get().map(PrometheusHandle::render)
}

/// Write the exposition text atomically (temp file + rename) to `path`.
pub fn write_textfile(path: &Path) -> anyhow::Result<()> {
    let body = render().context("Prometheus recorder not initialized")?;
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to move metrics file to {}", path.display()))?;
    tracing::debug!(path = %path.display(), "metrics textfile written");
    Ok(())
}
