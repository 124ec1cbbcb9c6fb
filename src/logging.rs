//! Structured logging setup and per-run operation tracking.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::Instant;

use tracing::instrument::Instrument;

use crate::config::{LogFormat, Settings};

/// Tracing and logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Log level or filter directive (`info`, `debug_repo_manager=debug`).
    pub log_level: String,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json_format: bool,
    /// Include the event target in human-readable output.
    pub include_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_format: false,
            include_target: false,
        }
    }
}

impl From<&Settings> for TracingConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            log_level: settings.log_level.clone(),
            json_format: settings.log_format == LogFormat::Json,
            ..Default::default()
        }
    }
}

/// Tracing error types.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Initialization error: {0}")]
    Initialization(String),
}

/// Install the global subscriber.
///
/// Fails when a subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

    let env_filter = EnvFilter::try_new(&config.log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| TracingError::Configuration(format!("Invalid log level: {}", e)))?;

    let registry = Registry::default().with(env_filter);

    if config.json_format {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false);
        registry.with(json_layer).try_init().map_err(|e| {
            TracingError::Initialization(format!("Failed to initialize JSON logging: {}", e))
        })?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(config.include_target);
        registry.with(fmt_layer).try_init().map_err(|e| {
            TracingError::Initialization(format!("Failed to initialize console logging: {}", e))
        })?;
    }

    tracing::debug!(level = %config.log_level, json = config.json_format, "Logging initialized");
    Ok(())
}

#[derive(Debug, Default)]
struct RunCounters {
    completed: u64,
    failed: u64,
    gauges: BTreeMap<String, String>,
}

/// Times the operations of one run and summarises them at the end.
#[derive(Debug)]
pub struct OperationTracker {
    started: Instant,
    counters: Mutex<RunCounters>,
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: Mutex::new(RunCounters::default()),
        }
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, RunCounters> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `future` as the operation `operation`, logging its start, its
    /// duration and whether it failed.
    pub async fn track<F, T, E>(
        &self,
        operation: &'static str,
        context: &[(&str, &str)],
        future: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let context = context
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        let span = tracing::info_span!("operation", operation);
        let start = Instant::now();
        tracing::info!(operation, context = %context, "Operation started");

        let result = future.instrument(span).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {
                self.counters().completed += 1;
                tracing::info!(operation, duration_ms, context = %context, "Operation completed");
            }
            Err(e) => {
                self.counters().failed += 1;
                tracing::error!(
                    operation,
                    duration_ms,
                    context = %context,
                    error = %e,
                    "Operation failed"
                );
            }
        }
        result
    }

    /// Record a named value to report in the run summary.
    pub fn set_gauge(&self, name: &str, value: impl Display) {
        self.counters()
            .gauges
            .insert(name.to_string(), value.to_string());
    }

    pub fn gauge(&self, name: &str) -> Option<String> {
        self.counters().gauges.get(name).cloned()
    }

    pub fn operations_completed(&self) -> u64 {
        self.counters().completed
    }

    pub fn operations_failed(&self) -> u64 {
        self.counters().failed
    }

    /// Emit the end-of-run summary event.
    pub fn log_summary(&self, success: bool) {
        let counters = self.counters();
        let gauges = counters
            .gauges
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(
            success,
            operations_completed = counters.completed,
            operations_failed = counters.failed,
            duration_ms = self.started.elapsed().as_millis() as u64,
            gauges = %gauges,
            "Run summary"
        );
    }
}
