//! OpenTelemetry integration for auth-service
//!
//! This module wires up the tracing subscriber, optional OTLP trace export and
//! the in-process authentication counters served by the metrics endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::{
    global,
    metrics::{Counter, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use serde::Serialize;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LoggingConfig, OtelConfig};

/// OpenTelemetry error types
#[derive(Debug, Error)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// OpenTelemetry provider for auth-service
///
/// Traces are exported over OTLP when enabled. Metrics stay in process: the
/// meter provider has no reader attached.
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    /// Create a new OtelProvider with the given configuration
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let tracer_provider = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;
            Some(Self::init_tracer_provider(endpoint, &resource)?)
        } else {
            None
        };

        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
        })
    }

    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let trace_config = Config::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource.clone());

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build())
    }

    /// Get a tracer from the provider
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        if let Some(ref tp) = self.tracer_provider {
            tp.tracer(name)
        } else {
            TracerProvider::builder().build().tracer(name)
        }
    }

    /// Get the meter for creating metrics
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    /// Check if trace export is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Shutdown the OpenTelemetry providers gracefully
    pub fn shutdown(&self) -> Result<(), OtelError> {
        if let Err(e) = self.meter_provider.shutdown() {
            return Err(OtelError::Shutdown(format!(
                "Meter shutdown failed: {:?}",
                e
            )));
        }

        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                if let Err(e) = result {
                    return Err(OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)));
                }
            }
        }

        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Point-in-time view of the authentication counters
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub logins_succeeded: u64,
    pub logins_failed: u64,
    pub verifications_succeeded: u64,
    pub verifications_failed: u64,
    pub rate_limited: u64,
    pub revocations: u64,
}

/// Authentication metrics
///
/// Each event is recorded on an OpenTelemetry counter and mirrored in an
/// atomic so the metrics endpoint can report totals without an exporter.
pub struct AuthMetrics {
    logins_total: Counter<u64>,
    verifications_total: Counter<u64>,
    rate_limited_total: Counter<u64>,
    revocations_total: Counter<u64>,

    logins_succeeded: AtomicU64,
    logins_failed: AtomicU64,
    verifications_succeeded: AtomicU64,
    verifications_failed: AtomicU64,
    rate_limited: AtomicU64,
    revocations: AtomicU64,
}

impl AuthMetrics {
    /// Create new metrics with the given meter
    pub fn new(meter: &Meter) -> Self {
        let logins_total = meter
            .u64_counter("auth_service_logins_total")
            .with_description("Login attempts by outcome")
            .init();

        let verifications_total = meter
            .u64_counter("auth_service_verifications_total")
            .with_description("Token verifications by outcome")
            .init();

        let rate_limited_total = meter
            .u64_counter("auth_service_rate_limited_total")
            .with_description("Login attempts rejected by the rate limiter")
            .init();

        let revocations_total = meter
            .u64_counter("auth_service_revocations_total")
            .with_description("Tokens revoked")
            .init();

        Self {
            logins_total,
            verifications_total,
            rate_limited_total,
            revocations_total,
            logins_succeeded: AtomicU64::new(0),
            logins_failed: AtomicU64::new(0),
            verifications_succeeded: AtomicU64::new(0),
            verifications_failed: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            revocations: AtomicU64::new(0),
        }
    }

    /// Record a login attempt; `outcome` is `success` or an error kind
    pub fn record_login(&self, method: &str, outcome: &str) {
        self.logins_total.add(
            1,
            &[
                KeyValue::new("method", method.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
        if outcome == "success" {
            self.logins_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.logins_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a token verification
    pub fn record_verification(&self, outcome: &str) {
        self.verifications_total
            .add(1, &[KeyValue::new("outcome", outcome.to_string())]);
        if outcome == "success" {
            self.verifications_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.verifications_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rate-limited attempt
    pub fn record_rate_limited(&self, scope: &str) {
        self.rate_limited_total
            .add(1, &[KeyValue::new("scope", scope.to_string())]);
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a revocation
    pub fn record_revocation(&self) {
        self.revocations_total.add(1, &[]);
        self.revocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Current totals
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            logins_succeeded: self.logins_succeeded.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            verifications_succeeded: self.verifications_succeeded.load(Ordering::Relaxed),
            verifications_failed: self.verifications_failed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            revocations: self.revocations.load(Ordering::Relaxed),
        }
    }
}

impl Default for AuthMetrics {
    /// Metrics recorded against the global meter
    fn default() -> Self {
        Self::new(&global::meter("auth-service"))
    }
}

fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize tracing subscriber with OpenTelemetry integration
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(parse_level(&logging.level));

    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("auth-service")));

    let pretty = logging.format == "pretty";
    let json_layer = (!pretty).then(|| tracing_subscriber::fmt::layer().json());
    let pretty_layer = pretty.then(|| tracing_subscriber::fmt::layer().pretty());

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}
