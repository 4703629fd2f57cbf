//! Observability utilities: tracing setup and per-service metric scopes.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::{ObservabilityConfig, ServiceKind};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing subscriber once for the process.
///
/// Log format defaults to plain text and can be switched to JSON via
/// `ONEBOX_LOG_FORMAT=json`. Filter defaults to `info` if `RUST_LOG` is unset.
pub fn init_tracing() {
    init_tracing_with(&ObservabilityConfig::default());
}

/// Initialize tracing from config. `RUST_LOG` and `ONEBOX_LOG_FORMAT` win over
/// the configured values.
pub fn init_tracing_with(config: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
        let json = std::env::var("ONEBOX_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(config.json_logs);

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

/// Metric namespace handed to a hosted service.
///
/// Names are prefixed with the scope prefix and every sample carries the
/// scope's labels. Emission goes through the `metrics` facade; without an
/// installed recorder the calls are no-ops.
#[derive(Debug, Clone)]
pub struct MetricsScope {
    prefix: String,
    labels: Vec<metrics::Label>,
}

impl MetricsScope {
    /// Root scope for the whole host.
    pub fn root(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            labels: Vec::new(),
        }
    }

    /// Child scope for one hosted service.
    pub fn scoped(&self, kind: ServiceKind) -> Self {
        let mut labels = self.labels.clone();
        labels.push(metrics::Label::new("service", kind.as_str()));
        Self {
            prefix: format!("{}_{}", self.prefix, kind.as_str()),
            labels,
        }
    }

    /// Add a constant label to every sample of this scope.
    pub fn with_label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.labels.push(metrics::Label::new(key, value.into()));
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn labels(&self) -> &[metrics::Label] {
        &self.labels
    }

    /// Fully qualified metric name.
    pub fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    pub fn counter(&self, name: &str) -> metrics::Counter {
        metrics::counter!(self.metric_name(name), self.labels.clone())
    }

    pub fn gauge(&self, name: &str) -> metrics::Gauge {
        metrics::gauge!(self.metric_name(name), self.labels.clone())
    }

    pub fn histogram(&self, name: &str) -> metrics::Histogram {
        metrics::histogram!(self.metric_name(name), self.labels.clone())
    }
}
