//! Tracing subscriber setup.

use crate::config::LoggingConfig;
use anyhow::Context;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. With `config.json`
/// events are written as JSON lines, otherwise in the human format.
///
/// # Errors
///
/// Fails if the filter directive is invalid or a global subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    install(config, BoxMakeWriter::new(std::io::stdout), true)
}

fn install(config: &LoggingConfig, writer: BoxMakeWriter, ansi: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .with_context(|| format!("invalid log filter {:?}", config.filter))?,
    };

    let output = fmt::layer().with_writer(writer);
    let output = if config.json {
        output.json().with_target(true).boxed()
    } else {
        output.with_ansi(ansi).boxed()
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .context("tracing subscriber already installed")?;
    Ok(())
}
