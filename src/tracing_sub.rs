use std::io;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::log_buffer::global_log;

/// Install the global subscriber. Output goes to the log buffer when one is
/// registered, otherwise to stderr. `RUST_LOG` overrides `default_level`.
/// Returns `false` when a subscriber was already installed.
pub fn init(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = match global_log() {
        Some(handle) => BoxMakeWriter::new(handle),
        None => BoxMakeWriter::new(io::stderr),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .with_ansi(false)
        .try_init()
        .is_ok()
}

pub fn init_default() -> bool {
    init("debug")
}
