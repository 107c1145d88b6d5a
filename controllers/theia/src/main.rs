//! Theia Controller
//!
//! Reconciles per-user Theia IDE instances into their runtime state:
//! - StatefulSet: the IDE workload itself
//! - Service: stable in-cluster access to the IDE
//! - VirtualService: optional Istio route under /theia/<ns>/<name>/
//!
//! Idle instances are automatically scaled to zero after a configurable
//! idle window, and child events are relayed onto the owning instance.

mod config;
mod controller;
mod culler;
mod error;
mod events;
mod metrics;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::error::ControllerError;
use config::Config;
use controller::Controller;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting Theia Controller");

    // kube's rustls transport needs a process-wide crypto provider; a
    // second install attempt just means one is already set.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        info!("rustls crypto provider already installed");
    }

    // Load configuration from environment variables, once.
    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace);
    info!("  Routing enabled: {}", config.use_routing);
    info!("  Routing gateway: {}", config.routing_gateway);
    info!("  Inject fsGroup: {}", config.add_fsgroup);
    info!("  Cull idle time: {:?}", config.cull_idle_time);
    info!("  Idleness check period: {:?}", config.idleness_check_period);
    info!("  Metrics address: {}", config.metrics_addr);

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
