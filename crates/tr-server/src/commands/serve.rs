use tokio::net::TcpListener;
use tracing::{info, warn};
use tr_gateway::EnvironmentService;
use tr_simulation::{Simulation, Ticker};

use crate::ConfigArgs;
use crate::transport;

pub async fn run(args: &ConfigArgs, port: u16) -> Result<(), String> {
    let config = super::load_config(args)?;
    let mode = config.mode;

    let sim = Simulation::bootstrap(config)
        .map_err(|e| e.to_string())?
        .into_shared();
    let ticker = Ticker::spawn(sim.clone()).await;
    let service = EnvironmentService::new(sim, mode);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| format!("cannot bind port {port}: {e}"))?;
    info!(port, %mode, "terrarium listening");

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let served = transport::serve(listener, service, shutdown).await;

    ticker.stop().await;
    info!("terrarium stopped");
    served.map_err(|e| e.to_string())
}
