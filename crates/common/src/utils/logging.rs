use std::io;
use tracing_subscriber::{fmt, EnvFilter};

/// Default directives when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVES: &str = "info,tower_http=info,axum=info";

/// Output layout of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// Parse a format name (`compact` / `json`), falling back to compact.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Initialize the global tracing subscriber writing to stdout.
/// - Respects `RUST_LOG` if set, otherwise [`DEFAULT_DIRECTIVES`]
/// - Safe to call more than once; later calls are ignored
pub fn init_logging(format: LogFormat) {
    match format {
        LogFormat::Compact => {
            let _ = fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .compact()
                .with_writer(io::stdout)
                .try_init();
        }
        LogFormat::Json => {
            let _ = fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .json()
                .with_writer(io::stdout)
                .try_init();
        }
    }
}
