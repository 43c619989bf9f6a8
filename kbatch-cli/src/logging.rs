//! Logging setup
//!
//! Console logging goes to stderr so rendered documents and JSON on stdout
//! stay machine-readable. With a log directory, a daily-rolling file layer is
//! added as well.

use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "kbatch_adapter=info,kbatch_cli=info";
const VERBOSE_FILTER: &str = "kbatch_adapter=debug,kbatch_cli=debug";

/// Installs the global subscriber
///
/// A log directory that cannot be opened is reported and skipped; logging
/// never stops the command from running.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Option<WorkerGuard> {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let console_layer = fmt::layer().with_target(false).with_writer(io::stderr);

    let (file_layer, guard, file_error) = match log_dir.map(open_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("File logging disabled: {}", e);
    }

    guard
}

fn open_appender(dir: &Path) -> Result<RollingFileAppender, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("cannot create {}: {}", dir.display(), e))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("kbatch")
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| e.to_string())
}
