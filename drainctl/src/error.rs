use nodedrain::config::ConfigError;
use nodedrain::node::DrainError;
use nodedrain::telemetry::TelemetryConfigError;
use snafu::Snafu;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to create client: '{}'", source))]
    ClientCreate { source: kube::Error },

    #[snafu(display("Invalid drain configuration: '{}'", source))]
    Config { source: ConfigError },

    #[snafu(display("Failed to drain node '{}': '{}'", node, source))]
    Drain { source: DrainError, node: String },

    #[snafu(display("Error configuring telemetry: '{}'", source))]
    TelemetryInit { source: TelemetryConfigError },
}
