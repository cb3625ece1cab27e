//! Tracing subscriber setup for the CLI.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Debug, Default)]
pub struct ObservabilityOptions {
    /// Directive used when `RUST_LOG` is unset, e.g. `info` or `conduit_plan=debug`.
    pub filter: String,
    /// Omit event targets from log lines.
    pub compact: bool,
}

impl ObservabilityOptions {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            compact: false,
        }
    }
}

/// Install a global `fmt` subscriber writing to stderr.
///
/// `RUST_LOG` wins over `options.filter` when set. Calling this twice is
/// harmless; the second install is reported and ignored.
pub fn init(options: ObservabilityOptions) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.filter))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(!options.compact);

    if let Err(err) = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
    {
        eprintln!("tracing init failed: {err}");
    }
}
