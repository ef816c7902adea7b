//! Installs `tracing` output for drain callers, configured from the environment.
use serde::Deserialize;
use snafu::ResultExt;
use std::env;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, registry::LookupSpan, EnvFilter, Registry,
};

const DEFAULT_FILTER_DIRECTIVE: LevelFilter = LevelFilter::INFO;

const FILTER_DIRECTIVE_ENV_VAR: &str = "TRACING_FILTER_DIRECTIVE";
const FORMATTER_ENV_VAR: &str = "LOGGING_FORMATTER";
const ANSI_ENABLED_ENV_VAR: &str = "LOGGING_ANSI_ENABLED";

/// The message format for logging tracing events.
///
/// See https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/format/index.html
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Human-readable, single-line logs for each event.
    Full,
    /// Like `Full`, but shorter.
    Compact,
    #[default]
    /// Multi-line logs for reading at a terminal.
    Pretty,
    /// Newline-delimited JSON logs.
    Json,
}

/// How tracing events are written to stdout.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct LogFormatter {
    message_format: MessageFormat,
    ansi_enabled: bool,
}

impl LogFormatter {
    pub fn try_from_env() -> Result<Self> {
        Self::try_from_lookup(|var| env::var(var).ok())
    }

    fn try_from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let message_format = match lookup(FORMATTER_ENV_VAR) {
            Some(formatter) => serde_plain::from_str(formatter.trim())
                .context(error::LogFormatterEnvSnafu { env_value: formatter })?,
            None => MessageFormat::default(),
        };

        let ansi_enabled = match lookup(ANSI_ENABLED_ENV_VAR) {
            Some(ansi_enabled) => ansi_enabled
                .trim()
                .to_lowercase()
                .parse()
                .context(error::LogAnsiEnvSnafu { env_value: ansi_enabled })?,
            None => false,
        };

        Ok(LogFormatter {
            message_format,
            ansi_enabled,
        })
    }

    /// Stacks the formatting layer on top of `subscriber`.
    fn layer_onto<S>(&self, subscriber: S) -> Box<dyn Subscriber + Send + Sync>
    where
        S: SubscriberExt + Send + Sync + for<'a> LookupSpan<'a> + 'static,
    {
        // Each formatter is a distinct layer type, so the whole subscriber is boxed instead.
        let ansi = self.ansi_enabled;
        match self.message_format {
            MessageFormat::Full => Box::new(subscriber.with(fmt::layer().with_ansi(ansi))),
            MessageFormat::Compact => {
                Box::new(subscriber.with(fmt::layer().compact().with_ansi(ansi)))
            }
            MessageFormat::Pretty => {
                Box::new(subscriber.with(fmt::layer().pretty().with_ansi(ansi)))
            }
            MessageFormat::Json => Box::new(subscriber.with(fmt::layer().json().with_ansi(ansi))),
        }
    }
}

/// Installs the global tracing subscriber.
///
/// Events are filtered by `TRACING_FILTER_DIRECTIVE` (default `info`), formatted according to
/// `LOGGING_FORMATTER` and colored if `LOGGING_ANSI_ENABLED=true`.
pub fn init_telemetry_from_env() -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(DEFAULT_FILTER_DIRECTIVE.into())
        .with_env_var(FILTER_DIRECTIVE_ENV_VAR)
        .from_env_lossy();

    let subscriber = LogFormatter::try_from_env()?.layer_onto(Registry::default().with(env_filter));

    tracing::subscriber::set_global_default(subscriber)
        .context(error::TracingConfigurationSnafu)?;

    Ok(())
}

pub mod error {
    use super::{ANSI_ENABLED_ENV_VAR, FORMATTER_ENV_VAR};
    use snafu::Snafu;
    use std::str::ParseBoolError;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum TelemetryConfigError {
        #[snafu(display("Error configuring tracing: '{}'", source))]
        TracingConfiguration {
            source: tracing::subscriber::SetGlobalDefaultError,
        },

        #[snafu(display(
            "Could not parse formatter from environment variable '{}={}': '{}'",
            FORMATTER_ENV_VAR,
            env_value,
            source
        ))]
        LogFormatterEnv {
            source: serde_plain::Error,
            env_value: String,
        },

        #[snafu(display(
            "Could not parse ANSI enablement from environment variable '{}={}': '{}'",
            ANSI_ENABLED_ENV_VAR,
            env_value,
            source
        ))]
        LogAnsiEnv {
            source: ParseBoolError,
            env_value: String,
        },
    }
}

type Result<T> = std::result::Result<T, TelemetryConfigError>;
pub use error::TelemetryConfigError;
