//! Structured logging for tessera.
//!
//! Installs a `tracing` subscriber with console output, an optional JSON log
//! file in debug builds, and a filter taken from `RUST_LOG` or the config's
//! `debug.log_level`.

use std::path::{Path, PathBuf};

use tessera_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file written under the log directory.
pub const LOG_FILE_NAME: &str = "tessera.log";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file (debug builds only)
/// * `debug_build` - whether file logging may be enabled
/// * `config` - optional configuration providing the log level
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// panics, as installing a second global subscriber does.
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_from_config(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true) // the recenter worker is named
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    let wants_file = debug_build && config.is_none_or(|c| c.debug.log_to_file);
    if wants_file
        && let Some(path) = log_dir.and_then(prepare_log_file)
        && let Ok(log_file) = std::fs::File::create(&path)
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Filter string derived from the config, falling back to [`DEFAULT_FILTER`].
pub fn filter_from_config(config: Option<&Config>) -> String {
    config
        .map(|c| c.debug.log_level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

/// An `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

/// Creates `dir` and returns the log file path inside it.
fn prepare_log_file(dir: &Path) -> Option<PathBuf> {
    std::fs::create_dir_all(dir).ok()?;
    Some(dir.join(LOG_FILE_NAME))
}
