//! Building the `tracing` dispatcher a session logs into.
//!
//! Nothing here installs a global subscriber: the returned [`Dispatch`] is
//! handed to a session (see `SessionOptions::with_dispatch`) or installed by
//! the caller.

use crate::config::{LogFormat, LoggingConfig};
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Dispatcher writing to stderr in the configured format.
pub fn dispatch(config: &LoggingConfig) -> Dispatch {
    dispatch_with_writer(config, std::io::stderr)
}

/// Dispatcher writing to `writer`. `RUST_LOG`, when set, overrides
/// `config.level`.
pub fn dispatch_with_writer<W>(config: &LoggingConfig, writer: W) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_writer(writer);

    match config.format {
        LogFormat::Json => Dispatch::new(builder.json().finish()),
        LogFormat::Pretty => Dispatch::new(builder.pretty().finish()),
        LogFormat::Compact => Dispatch::new(builder.compact().finish()),
    }
}
