use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "obed=warn";

/// Structured logging to stderr; stdout carries the IPC stream.
///
/// `OBED_LOG` takes an `EnvFilter` directive (`debug`, `obed=trace`, ...),
/// `OBED_LOG_JSON=1` switches to JSON lines.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match std::env::var("OBED_LOG") {
        Ok(level) if !level.trim().is_empty() => {
            let level = level.trim();
            if level.contains('=') {
                EnvFilter::try_new(level)?
            } else {
                EnvFilter::try_new(format!("obed={}", level))?
            }
        }
        _ => EnvFilter::new(DEFAULT_FILTER),
    };
    let log_json = std::env::var("OBED_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }
    Ok(())
}
