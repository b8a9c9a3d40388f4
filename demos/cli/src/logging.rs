//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! - `warn`: timestamps missing several organ systems, patients without rows
//! - `info`: per-patient extraction and scoring summaries
//! - `debug`: dropped records and ignored pressor rates

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact single-line format.
    #[default]
    Compact,
    /// JSON format for machine parsing.
    Json,
}

/// Map the `-v` count to a level: none is warn, `-v` info, `-vv` debug, more is trace.
pub fn level_from_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber on stderr. `RUST_LOG` overrides `level`.
pub fn init_logging(level: Level, format: LogFormat) {
    let filter = build_env_filter(level);
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact().without_time())
            .init(),
    }
}

fn build_env_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_lowercase();
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // other crates stay at warn
        EnvFilter::new(format!(
            "warn,sofa_cli={level},sofa_core={level},sofa_fhir={level}"
        ))
    })
}
