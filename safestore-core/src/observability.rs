/*!
Observability infrastructure for SafeStore.

- Structured logging and tracing setup for binaries
- Prometheus counters for saves, rejections and backups (`metrics` feature)

Library code only emits `tracing` events; installing a subscriber is left to
the process that embeds the store.
*/

#[cfg(feature = "metrics")]
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

#[cfg(feature = "metrics")]
use crate::error::FailureKind;
use crate::{Result, StoreError};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<SafeStoreMetrics> = OnceLock::new();

/// Metrics collection for save operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct SafeStoreMetrics {
    pub saves_written_total: IntCounter,
    pub saves_rejected_total: IntCounterVec,
    pub backups_created_total: IntCounter,
    pub backup_failures_total: IntCounter,
    pub items_written: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
impl SafeStoreMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let saves_written_total = IntCounter::new(
            "safestore_saves_written_total",
            "Snapshots successfully written",
        )
        .map_err(|e| StoreError::storage(format!("Failed to create saves_written_total metric: {e}")))?;

        let saves_rejected_total = IntCounterVec::new(
            Opts::new(
                "safestore_saves_rejected_total",
                "Save attempts that did not replace the snapshot, by failure kind",
            ),
            &["failure"],
        )
        .map_err(|e| StoreError::storage(format!("Failed to create saves_rejected_total metric: {e}")))?;

        let backups_created_total = IntCounter::new(
            "safestore_backups_created_total",
            "Backups taken before overwriting a snapshot",
        )
        .map_err(|e| StoreError::storage(format!("Failed to create backups_created_total metric: {e}")))?;

        let backup_failures_total = IntCounter::new(
            "safestore_backup_failures_total",
            "Backups that could not be taken",
        )
        .map_err(|e| StoreError::storage(format!("Failed to create backup_failures_total metric: {e}")))?;

        let items_written = Histogram::with_opts(
            HistogramOpts::new("safestore_items_written", "Items per written snapshot")
                .buckets(vec![1.0, 3.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
        )
        .map_err(|e| StoreError::storage(format!("Failed to create items_written metric: {e}")))?;

        registry
            .register(Box::new(saves_written_total.clone()))
            .map_err(|e| StoreError::storage(format!("Failed to register saves_written_total: {e}")))?;
        registry
            .register(Box::new(saves_rejected_total.clone()))
            .map_err(|e| StoreError::storage(format!("Failed to register saves_rejected_total: {e}")))?;
        registry
            .register(Box::new(backups_created_total.clone()))
            .map_err(|e| StoreError::storage(format!("Failed to register backups_created_total: {e}")))?;
        registry
            .register(Box::new(backup_failures_total.clone()))
            .map_err(|e| StoreError::storage(format!("Failed to register backup_failures_total: {e}")))?;
        registry
            .register(Box::new(items_written.clone()))
            .map_err(|e| StoreError::storage(format!("Failed to register items_written: {e}")))?;

        Ok(Self {
            saves_written_total,
            saves_rejected_total,
            backups_created_total,
            backup_failures_total,
            items_written,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static SafeStoreMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize SafeStore metrics"))
    }

    pub fn record_saved(&self, items: usize) {
        self.saves_written_total.inc();
        self.items_written.observe(items as f64);
    }

    pub fn record_rejected(&self, failure: FailureKind) {
        self.saves_rejected_total
            .with_label_values(&[failure.as_str()])
            .inc();
    }

    pub fn record_backup(&self) {
        self.backups_created_total.inc();
    }

    pub fn record_backup_failure(&self) {
        self.backup_failures_total.inc();
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| StoreError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| StoreError::storage(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Output format and default verbosity for the process-wide subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    /// Directive used when `RUST_LOG` is not set, e.g. `safestore=info`
    pub default_directive: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json: false,
            default_directive: "safestore=info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.default_directive = "debug".to_string();
        }
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// `RUST_LOG` if set, otherwise the default directive
    pub fn env_filter(&self) -> Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_directive).map_err(|e| {
                StoreError::config(format!(
                    "Invalid log directive '{}': {e}",
                    self.default_directive
                ))
            }),
        }
    }
}

/// Install the global tracing subscriber
///
/// # Errors
/// Fails if the log directive is invalid or a subscriber is already installed.
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    #[cfg(feature = "metrics")]
    SafeStoreMetrics::global();

    let filter = config.env_filter()?;
    let registry = TracingRegistry::default().with(filter);

    let installed = if config.json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(true);
        set_global_default(registry.with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
        set_global_default(registry.with(fmt_layer))
    };
    installed.map_err(|e| {
        StoreError::config(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("SafeStore observability initialized");
    Ok(())
}

/// Initialize observability with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(&ObservabilityConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert!(!config.json);
        assert_eq!(config.default_directive, "safestore=info");
        assert_eq!(config.clone().verbose(true).default_directive, "debug");
        assert!(config.json(true).json);
    }

    #[test]
    fn test_invalid_directive_is_config_error() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = ObservabilityConfig {
            json: false,
            default_directive: "safestore=notalevel".to_string(),
        };
        assert!(matches!(config.env_filter(), Err(StoreError::Config(_))));
    }
}

#[cfg(all(test, feature = "metrics"))]
mod metrics_tests {
    use super::*;

    #[test]
    fn test_metrics_recording_and_gathering() {
        let metrics = SafeStoreMetrics::global();
        metrics.record_saved(6);
        metrics.record_rejected(FailureKind::SchemaViolation);
        metrics.record_backup();
        metrics.record_backup_failure();

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("safestore_saves_written_total"));
        assert!(text.contains("failure=\"schema_violation\""));
    }
}
