//! Prometheus metrics for a batch process: the recorder lives in-process and
//! its rendering is written to a node-exporter textfile when the run ends.

use std::path::Path;

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global recorder. Later calls are no-ops.
pub fn init() -> anyhow::Result<()> {
    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;
    // Ignore error if the handle was already set; only one recorder can win.
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub fn render() -> Option<String> {
    PROM_HANDLE.get().map(PrometheusHandle::render)
}

/// Write the current metrics to `path`, replacing it atomically so the
/// collector never reads a half-written file.
pub fn write_textfile(path: &Path) -> anyhow::Result<()> {
    let Some(body) = render() else {
        tracing::debug!("metrics recorder not installed, no textfile written");
        return Ok(());
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("failed to move metrics into {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote metrics textfile");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textfile_holds_recorded_counters() {
        init().unwrap();
        metrics::counter!("textfile_test_events_total").increment(3);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics").join("leak_etl.prom");
        write_textfile(&path).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("textfile_test_events_total 3"));
        assert!(!path.with_extension("prom.tmp").exists());
    }
}
