//! Structured logging setup.
//!
//! Everything is written to stderr: a worker child's stdout is its result
//! channel and must carry nothing but protocol lines.
//!
//! `RUST_LOG` takes precedence over the level chosen here.

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: text, json", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Include the module target (e.g. repobuild::pipeline::pool)
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            include_target: false,
        }
    }
}

impl LoggingConfig {
    /// Config for the CLI flags: `--verbose` lowers the level to DEBUG.
    pub fn from_flags(verbose: bool, format: LogFormat) -> Self {
        Self {
            level: if verbose { Level::DEBUG } else { Level::INFO },
            format,
            include_target: verbose,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_string().to_lowercase()))
    }
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.filter();
        let result = match config.format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target),
                )
                .try_init(),
            LogFormat::Text => tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target),
                )
                .try_init(),
        };
        if let Err(e) = result {
            eprintln!("Failed to initialise logging: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        let quiet = LoggingConfig::from_flags(false, LogFormat::Text);
        assert_eq!(quiet.level, Level::INFO);
        assert!(!quiet.include_target);

        let verbose = LoggingConfig::from_flags(true, LogFormat::Json);
        assert_eq!(verbose.level, Level::DEBUG);
        assert_eq!(verbose.format, LogFormat::Json);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("yaml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(LoggingConfig::default());
        init_logging(LoggingConfig::from_flags(true, LogFormat::Json));
    }
}
