//! Kubernetes resource watchers.
//!
//! This module translates change notifications into reconcile-by-name
//! calls on the engine: Theia changes reconcile themselves, pod changes
//! reconcile the owning instance via the pod's label, and workload events
//! are relayed onto the instance before reconciling it. Requeue requests
//! returned by the engine are honored here with delayed re-reconcile
//! tasks, one per instance at a time.

use crate::error::ControllerError;
use crate::events;
use crate::reconciler::Reconciler;
use crds::{THEIA_NAME_LABEL, Theia};
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::{Event as CoreEvent, Pod};
use kube::Api;
use kube_runtime::watcher;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    theia_api: Api<Theia>,
    pod_api: Api<Pod>,
    event_api: Api<CoreEvent>,
    /// Instances with a delayed recheck in flight, so idleness polling
    /// never piles up more than one task per instance.
    pending_rechecks: Mutex<HashSet<String>>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        theia_api: Api<Theia>,
        pod_api: Api<Pod>,
        event_api: Api<CoreEvent>,
    ) -> Self {
        Self {
            reconciler,
            theia_api,
            pod_api,
            event_api,
            pending_rechecks: Mutex::new(HashSet::new()),
        }
    }

    /// Starts watching Theia resources.
    pub async fn watch_theias(self: Arc<Self>) -> Result<(), ControllerError> {
        info!("Starting Theia watcher");

        let mut stream = Box::pin(watcher(self.theia_api.clone(), watcher::Config::default()));

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(format!("Theia watcher stream error: {e}")))?
        {
            match event {
                watcher::Event::Apply(theia) | watcher::Event::InitApply(theia) => {
                    let name = theia.metadata.name.as_deref().unwrap_or("<unknown>");
                    debug!("Theia applied: {}", name);
                    self.reconcile_and_schedule(name.to_string()).await;
                }
                watcher::Event::Delete(theia) => {
                    let name = theia.metadata.name.as_deref().unwrap_or("<unknown>");
                    // Children follow through their owner references.
                    info!("Theia deleted: {}", name);
                }
                watcher::Event::Init => {
                    info!("Theia watcher initialized");
                }
                watcher::Event::InitDone => {
                    info!("Theia watcher initialization complete");
                }
            }
        }

        Ok(())
    }

    /// Starts watching the pods generated for Theia instances. Only pods
    /// carrying the instance label are watched at all.
    pub async fn watch_pods(self: Arc<Self>) -> Result<(), ControllerError> {
        info!("Starting pod watcher");

        let config = watcher::Config::default().labels(THEIA_NAME_LABEL);
        let mut stream = Box::pin(watcher(self.pod_api.clone(), config));

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(format!("Pod watcher stream error: {e}")))?
        {
            match event {
                watcher::Event::Apply(pod) | watcher::Event::Delete(pod) => {
                    let Some(parent) = pod
                        .metadata
                        .labels
                        .as_ref()
                        .and_then(|labels| labels.get(THEIA_NAME_LABEL))
                        .cloned()
                    else {
                        continue;
                    };
                    debug!(
                        "Pod {} changed, reconciling Theia {}",
                        pod.metadata.name.as_deref().unwrap_or("<unknown>"),
                        parent
                    );
                    self.reconcile_and_schedule(parent).await;
                }
                watcher::Event::Init | watcher::Event::InitApply(_) => {
                    // Initial pod listing carries no new information; the
                    // Theia watcher already reconciles every instance.
                }
                watcher::Event::InitDone => {
                    debug!("Pod watcher initialization complete");
                }
            }
        }

        Ok(())
    }

    /// Starts watching cluster events so child failures surface on the
    /// owning instance.
    pub async fn watch_events(self: Arc<Self>) -> Result<(), ControllerError> {
        info!("Starting event watcher");

        let mut stream = Box::pin(watcher(self.event_api.clone(), watcher::Config::default()));

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(format!("Event watcher stream error: {e}")))?
        {
            match event {
                watcher::Event::Apply(cluster_event) => {
                    // Eligibility first; skips the pod lookup for the
                    // vast majority of cluster events.
                    if events::involved_workload(&cluster_event).is_none() {
                        continue;
                    }
                    match self.reconciler.relay_event(&cluster_event).await {
                        Ok(Some(parent)) => self.reconcile_and_schedule(parent).await,
                        Ok(None) => {}
                        Err(e) => warn!("Failed to relay event: {}", e),
                    }
                }
                watcher::Event::Init
                | watcher::Event::InitApply(_)
                | watcher::Event::InitDone
                | watcher::Event::Delete(_) => {
                    // Stale events from the initial listing are not
                    // re-relayed, and deletions carry nothing to relay.
                }
            }
        }

        Ok(())
    }

    /// Runs one reconcile pass and honors its requeue request, if any.
    async fn reconcile_and_schedule(self: &Arc<Self>, name: String) {
        match self.reconciler.reconcile_theia(&name).await {
            Ok(outcome) => {
                if let Some(delay) = outcome.requeue_after {
                    self.schedule_recheck(name, delay);
                }
            }
            Err(e) => {
                error!("Failed to reconcile Theia {}: {}", name, e);
            }
        }
    }

    /// Spawns a delayed re-reconcile for one instance. At most one
    /// recheck task runs per instance; the task keeps itself alive while
    /// the engine keeps asking for requeues.
    fn schedule_recheck(self: &Arc<Self>, name: String, delay: Duration) {
        {
            let mut pending = match self.pending_rechecks.lock() {
                Ok(pending) => pending,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !pending.insert(name.clone()) {
                return;
            }
        }

        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut delay = delay;
            loop {
                tokio::time::sleep(delay).await;
                match watcher.reconciler.reconcile_theia(&name).await {
                    Ok(outcome) => match outcome.requeue_after {
                        Some(next_delay) => delay = next_delay,
                        None => break,
                    },
                    Err(e) => {
                        // The next watch notification re-triggers this
                        // instance; the recheck loop is only for polling.
                        warn!("Recheck of Theia {} failed: {}", name, e);
                        break;
                    }
                }
            }
            let mut pending = match watcher.pending_rechecks.lock() {
                Ok(pending) => pending,
                Err(poisoned) => poisoned.into_inner(),
            };
            pending.remove(&name);
        });
    }
}
