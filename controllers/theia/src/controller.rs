//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires up the
//! Kubernetes client, the reconciler, and the resource watchers for the
//! Theia Controller.

use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::{self, Metrics};
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crate::reconciler::virtual_service;
use crds::Theia;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Event as CoreEvent, Pod, Service};
use kube::core::DynamicObject;
use kube::runtime::events::{Recorder, Reporter};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for Theia instance management.
pub struct Controller {
    theia_watcher: JoinHandle<Result<(), ControllerError>>,
    pod_watcher: JoinHandle<Result<(), ControllerError>>,
    event_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing Theia Controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await?;

        let ns = config.watch_namespace.clone();
        let theia_api: Api<Theia> = Api::namespaced(kube_client.clone(), &ns);
        let statefulset_api: Api<StatefulSet> = Api::namespaced(kube_client.clone(), &ns);
        let service_api: Api<Service> = Api::namespaced(kube_client.clone(), &ns);
        let pod_api: Api<Pod> = Api::namespaced(kube_client.clone(), &ns);
        let event_api: Api<CoreEvent> = Api::namespaced(kube_client.clone(), &ns);
        // The route API only exists for us when routing is enabled.
        let virtual_service_api: Option<Api<DynamicObject>> = config.use_routing.then(|| {
            Api::namespaced_with(kube_client.clone(), &ns, &virtual_service::api_resource())
        });

        let recorder = Recorder::new(
            kube_client.clone(),
            Reporter {
                controller: "theia-controller".to_string(),
                instance: None,
            },
        );

        let metrics = Metrics::new()?;
        let metrics_addr = config.metrics_addr.clone();

        let reconciler = Arc::new(Reconciler::new(
            theia_api.clone(),
            statefulset_api,
            service_api,
            pod_api.clone(),
            virtual_service_api,
            recorder,
            config,
            metrics.clone(),
        ));

        let watcher_instance = Arc::new(Watcher::new(reconciler, theia_api, pod_api, event_api));

        // Start all watchers in background tasks
        let theia_watcher = {
            let watcher = Arc::clone(&watcher_instance);
            tokio::spawn(async move { watcher.watch_theias().await })
        };

        let pod_watcher = {
            let watcher = Arc::clone(&watcher_instance);
            tokio::spawn(async move { watcher.watch_pods().await })
        };

        let event_watcher = {
            let watcher = watcher_instance;
            tokio::spawn(async move { watcher.watch_events().await })
        };

        let metrics_server = tokio::spawn(metrics::serve(metrics, metrics_addr));

        Ok(Self {
            theia_watcher,
            pod_watcher,
            event_watcher,
            metrics_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Theia Controller running");

        // Wait for any task to exit (they should run forever)
        tokio::select! {
            result = &mut self.theia_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Theia watcher panicked: {e}")))??;
            }
            result = &mut self.pod_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Pod watcher panicked: {e}")))??;
            }
            result = &mut self.event_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Event watcher panicked: {e}")))??;
            }
            result = &mut self.metrics_server => {
                result.map_err(|e| ControllerError::Watch(format!("Metrics server panicked: {e}")))??;
            }
        }

        Ok(())
    }
}
