//! Prometheus counters and the metrics/probes HTTP endpoint.
//!
//! The reconciler increments these counters as side effects; scraping and
//! alerting on them is an operator concern.

use crate::error::ControllerError;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::{error, info};

/// Counter bundle shared across reconcile passes.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Child creation attempts, labelled by namespace.
    pub creations: IntCounterVec,
    /// Child creation failures, labelled by namespace.
    pub creation_failures: IntCounterVec,
    /// Culling decisions, labelled by namespace and instance name.
    pub cullings: IntCounterVec,
}

impl Metrics {
    /// Creates and registers all controller counters.
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let creations = IntCounterVec::new(
            Opts::new("theia_create_total", "Total Theia child creation attempts"),
            &["namespace"],
        )
        .map_err(|e| ControllerError::Metrics(e.to_string()))?;
        let creation_failures = IntCounterVec::new(
            Opts::new(
                "theia_create_failed_total",
                "Total failed Theia child creations",
            ),
            &["namespace"],
        )
        .map_err(|e| ControllerError::Metrics(e.to_string()))?;
        let cullings = IntCounterVec::new(
            Opts::new("theia_culling_total", "Total Theia culling events"),
            &["namespace", "name"],
        )
        .map_err(|e| ControllerError::Metrics(e.to_string()))?;

        for collector in [&creations, &creation_failures, &cullings] {
            registry
                .register(Box::new(collector.clone()))
                .map_err(|e| ControllerError::Metrics(e.to_string()))?;
        }

        Ok(Self {
            registry,
            creations,
            creation_failures,
            cullings,
        })
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

async fn metrics_handler(State(metrics): State<Metrics>) -> String {
    metrics.render()
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Serves `/metrics` and `/healthz` until shutdown.
pub async fn serve(metrics: Metrics, addr: String) -> Result<(), ControllerError> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ControllerError::Metrics(format!("failed to bind {addr}: {e}")))?;
    info!("Metrics server listening on {}", addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| ControllerError::Metrics(format!("metrics server error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_register_and_render() {
        let metrics = Metrics::new().expect("register counters");
        metrics.creations.with_label_values(&["default"]).inc();
        metrics
            .cullings
            .with_label_values(&["default", "alice"])
            .inc();

        let rendered = metrics.render();
        assert!(rendered.contains("theia_create_total"));
        assert!(rendered.contains("theia_culling_total"));
    }
}
