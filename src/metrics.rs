//! Metrics sink for control loop operations.
//!
//! The sink is handed to components as an explicit dependency. The default
//! backend just logs; tests swap in a recording backend.

use log::debug;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    High,
}

pub trait MetricsBackend: Send + Sync {
    fn add_error(&self, asset: &str, operation: &str, severity: Severity);
    fn record_duration(&self, asset: &str, operation: &str, duration: Duration);
}

/// Scope guard for one operation. Records the operation duration when
/// dropped; errors are reported through it explicitly.
pub struct Metric<'a> {
    backend: &'a dyn MetricsBackend,
    asset: &'a str,
    operation: &'static str,
    started: Instant,
}

impl<'a> Metric<'a> {
    pub fn new(backend: &'a dyn MetricsBackend, asset: &'a str, operation: &'static str) -> Self {
        Metric {
            backend,
            asset,
            operation,
            started: Instant::now(),
        }
    }

    pub fn add_error(&self, severity: Severity) {
        self.backend.add_error(self.asset, self.operation, severity);
    }
}

impl Drop for Metric<'_> {
    fn drop(&mut self) {
        self.backend
            .record_duration(self.asset, self.operation, self.started.elapsed());
    }
}

/// Backend that forwards everything to the log.
pub struct LogMetrics;

impl MetricsBackend for LogMetrics {
    fn add_error(&self, asset: &str, operation: &str, severity: Severity) {
        debug!("Metric error: asset({asset}) operation({operation}) severity({severity:?})");
    }

    fn record_duration(&self, asset: &str, operation: &str, duration: Duration) {
        debug!(
            "Metric duration: asset({asset}) operation({operation}) took {}ms",
            duration.as_millis()
        );
    }
}
