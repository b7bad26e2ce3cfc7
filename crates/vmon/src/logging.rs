//! Logging setup, replacing the original's hand-rolled `g_log_set_handler`
//! / `fprintf` handler (`vmon_setup_log`) with `tracing-subscriber`.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Maps the CLI's 0-5 verbosity scale onto a `tracing` level the same way
/// the original's `log_enabled` mask comparison gated GLib's log flags:
/// higher `--log-level` means more verbose output.
fn level_for(log_level: u8) -> Level {
    match log_level {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initializes the global subscriber. `log_file` is opened for append if
/// given; otherwise output goes to stderr, matching `vmon_setup_log`'s
/// stderr fallback.
pub fn init(log_level: u8, log_file: Option<&Path>) -> anyhow::Result<()> {
    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("failed to open log file '{}': {e}", path.display()))?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_max_level(level_for(log_level))
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}
