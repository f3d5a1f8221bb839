//! Prometheus recorder for the process-local cache counters.
//!
//! The engine records through the `metrics` facade; this module installs the
//! `metrics-exporter-prometheus` recorder and renders its text output. How the
//! output is exposed (HTTP route, push job) is up to the embedding service.
//!
//! # Metrics Exposed
//!
//! - `scopeacl_cache_hits_total{tier}` - Snapshot cache hits
//! - `scopeacl_cache_misses_total` - Lookups that missed every tier
//! - `scopeacl_cache_invalidations_total` - User invalidations
//! - `scopeacl_snapshot_loads_total` - Snapshots loaded from storage
//! - `scopeacl_batch_checks_total` - Abilities checked through batch checks
//! - `scopeacl_batch_check_duration_seconds` - Batch check duration
//! - `scopeacl_cache_warm_duration_seconds` - Cache warm duration

use std::sync::Arc;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Handle for rendering the recorded metrics.
#[derive(Clone)]
pub struct MetricsState {
    handle: Arc<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Renders the current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for MetricsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsState").finish_non_exhaustive()
    }
}

/// Error type for metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: recorder already installed")]
    AlreadyInstalled,
}

/// Installs the Prometheus recorder as the global `metrics` recorder.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics() -> Result<MetricsState, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|_| MetricsError::AlreadyInstalled)?;

    register_default_metrics();

    Ok(MetricsState::new(handle))
}

fn register_default_metrics() {
    scopeacl_domain::cache::register_cache_metrics();

    metrics::describe_histogram!(
        "scopeacl_batch_check_duration_seconds",
        "Batch check duration in seconds"
    );
    metrics::describe_histogram!(
        "scopeacl_cache_warm_duration_seconds",
        "Cache warm duration in seconds"
    );
    metrics::describe_counter!(
        "scopeacl_cache_warm_failures_total",
        "Users whose snapshot could not be warmed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only one recorder can be installed per process; this is the only test
    // in the crate that installs one.
    #[test]
    fn test_init_metrics_renders_recorded_counters() {
        let state = init_metrics().unwrap();

        metrics::counter!("scopeacl_cache_hits_total", "tier" => "shared").increment(3);

        let rendered = state.render();
        assert!(rendered.contains("scopeacl_cache_hits_total"));
        assert!(rendered.contains("tier=\"shared\""));
        assert!(matches!(init_metrics(), Err(MetricsError::AlreadyInstalled)));
    }
}
