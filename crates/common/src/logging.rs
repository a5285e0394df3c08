use crate::config::{Environment, LogLevel};
use crate::telemetry::TelemetryGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// When a [`TelemetryGuard`] is supplied, spans are also bridged to its
/// OpenTelemetry tracer.
pub fn setup_logging(
    log_level: LogLevel,
    environment: Environment,
    telemetry: Option<&TelemetryGuard>,
) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.as_str()));

    let otel_layer =
        telemetry.map(|guard| tracing_opentelemetry::layer().with_tracer(guard.tracer()));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}
