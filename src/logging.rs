//! Tracing subscriber setup for applications embedding the index

use crate::config::LoggingConfig;
use crate::error::{IndexError, IndexResult};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Install the global subscriber described by `config`
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> IndexResult<()> {
    let json = match config.format.as_str() {
        "json" => true,
        "pretty" => false,
        other => {
            return Err(IndexError::Config(format!(
                "unknown log format {:?} (expected \"pretty\" or \"json\")",
                other
            )))
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| IndexError::Config(format!("invalid log level {:?}: {}", config.level, e)))?;

    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt = tracing_subscriber::fmt::layer().with_writer(writer);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt.json().boxed()
    } else {
        fmt.pretty().boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| IndexError::Config(format!("failed to install subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_format_rejected() {
        let config = LoggingConfig {
            format: "xml".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(init(&config), Err(IndexError::Config(_))));
    }
}
