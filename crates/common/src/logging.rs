use crate::config::Environment;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` is used (for example
/// `"info,shim=debug"`). Development gets pretty, colored output and production
/// gets one JSON object per event. Use [`TelemetryGuard`](crate::TelemetryGuard)
/// instead when spans and metrics should also be exported over OTLP.
///
/// Calling this twice is harmless: the second installation attempt is ignored.
pub fn setup_logging(environment: Environment, default_directive: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match environment {
        Environment::Production => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_level(true)
                    .with_thread_names(true),
            )
            .try_init(),
        Environment::Development => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_thread_names(true),
            )
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed, keeping the existing one");
    }
}
