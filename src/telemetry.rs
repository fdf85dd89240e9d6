use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize structured JSON logging on stderr.
///
/// `INFO` enables informational logging, any other level keeps only errors.
/// `RUST_LOG` takes precedence when set.
pub fn init_telemetry(log_level: &str) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)?,
        _ => EnvFilter::new(default_directive(log_level)),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()?;

    tracing::info!("ca-to-us telemetry initialized with structured logging");
    Ok(())
}

fn default_directive(log_level: &str) -> &'static str {
    if log_level.eq_ignore_ascii_case("INFO") {
        "info"
    } else {
        "error"
    }
}

/// Generate a correlation ID for linking the log lines of one invocation
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping one conversion attempt
pub fn create_conversion_span(
    operation: &str,
    vin: Option<&str>,
    incident: Option<&str>,
    correlation_id: &str,
) -> tracing::Span {
    tracing::info_span!(
        "conversion",
        operation = operation,
        vehicle.vin = vin,
        incident = incident,
        correlation.id = correlation_id,
    )
}
