//! Serves the calculator on the registry and direct ports until Ctrl+C.
//!
//! Ports and the published name come from `CALCNET_REGISTRY_ADDR`,
//! `CALCNET_SERVICE_ADDR`, `CALCNET_SERVICE_NAME` and
//! `CALCNET_CALL_TIMEOUT_MS`; the worker pool size from
//! `CALCNET_SERVER_THREADS`.

use calcnet::{host::ServiceHost, runtime, ServiceConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("calcnet=info".parse()?))
        .init();

    let worker_threads = runtime::server_worker_threads();
    info!("Starting runtime with {worker_threads} worker threads");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async {
        if let Err(e) = run().await {
            error!("Failed to start calculator server: {e}");
            return Err(e);
        }
        Ok(())
    })
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from_env()?;
    let host = ServiceHost::start(config).await?;

    info!(
        "Service '{}' is now available on port {}",
        host.config().service_name,
        host.config().registry_addr.port()
    );
    info!("Press Ctrl+C to stop the server...");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    host.shutdown().await?;
    Ok(())
}
