use argh::FromArgs;
use nodedrain::cancel::Cancellation;
use nodedrain::config::DrainConfig;
use nodedrain::node::{ComputerName, DrainRequest, Drainer, K8SClusterClient, NodeRole};
use nodedrain::telemetry;
use snafu::ResultExt;
use tracing::{event, Level};

use std::env;
use std::fs;
use std::process;

mod error;
use error::Result;

const TERMINATION_LOG: &str = "/dev/termination-log";

#[derive(FromArgs, Debug)]
/// Cordon a Kubernetes Node, evict its Pods and delete it.
struct Arguments {
    /// computer name of the machine whose Node is drained
    #[argh(option)]
    node: String,

    /// role of the Node's pool: master, infra or compute
    #[argh(option)]
    role: NodeRole,
}

#[tokio::main]
async fn main() {
    let args: Arguments = argh::from_env();
    let termination_log = env::var("TERMINATION_LOG").unwrap_or(TERMINATION_LOG.to_string());

    if let Err(error) = run(args).await {
        event!(Level::ERROR, %error, "Drain failed.");
        if let Err(write_error) = fs::write(&termination_log, format!("{}", error)) {
            eprintln!(
                "Could not write termination log '{}': {}",
                termination_log, write_error
            );
        }
        eprintln!("{}", error);
        process::exit(1);
    }
}

async fn run(args: Arguments) -> Result<()> {
    telemetry::init_telemetry_from_env().context(error::TelemetryInitSnafu)?;

    let config = DrainConfig::try_from_env().context(error::ConfigSnafu)?;
    let k8s_client = kube::Client::try_default()
        .await
        .context(error::ClientCreateSnafu)?;

    let drainer = Drainer::new(K8SClusterClient::new(k8s_client), config);
    let request = DrainRequest::new(ComputerName::new(args.node.as_str()), args.role);

    // Ctrl-C abandons the drain wherever it is.
    let cancel = Cancellation::on_signal(async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    });

    let outcome = drainer
        .drain_node(&request, &cancel)
        .await
        .context(error::DrainSnafu { node: args.node })?;

    event!(Level::INFO, ?outcome, "Drain complete.");
    Ok(())
}
