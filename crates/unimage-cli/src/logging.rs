//! Tracing subscriber setup for the CLI.

use anyhow::{Context, Result};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Routes `log` records into tracing and installs a stderr subscriber.
/// `RUST_LOG` wins over `verbose`.
pub fn init(verbose: bool, json: bool) -> Result<()> {
    LogTracer::init().context("Failed to bridge log records into tracing")?;

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = if json {
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber)
    };
    installed.context("Failed to install tracing subscriber")
}
