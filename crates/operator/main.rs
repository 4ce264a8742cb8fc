use std::future::Future;

use kube::Client;
use metal_cluster::api::scheme::scheme;
use metal_cluster::controllers::cluster_controller::{self, State};
use metal_cluster::util::config::ControllerConfig;
use metal_cluster::util::telemetry;
use tracing::*;

mod handlers;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ControllerConfig::from_env()?;
    telemetry::init(config.log_format).await?;
    info!("starting metal cluster controller, serving on {}", config.bind_address);

    let scheme = scheme();
    let client = Client::try_default().await?;

    // Initialize Kubernetes controller state
    let state = State::default();
    let bind_address = config.bind_address.clone();
    let controller = cluster_controller::run(state.clone(), client, config, &scheme);
    let server = server::start_server(state, &bind_address);

    run_until_failure(controller, server).await
}

/// Drive the controller and the HTTP server together. Both shut down
/// gracefully on a signal; the first one to fail ends the process.
async fn run_until_failure<C, S>(controller: C, server: S) -> anyhow::Result<()>
where
    C: Future<Output = anyhow::Result<()>>,
    S: Future<Output = anyhow::Result<()>>,
{
    tokio::try_join!(controller, server)?;
    Ok(())
}
