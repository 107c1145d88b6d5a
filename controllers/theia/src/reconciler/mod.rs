//! Reconciliation engine for Theia instances.
//!
//! One pass converges a single instance: fetch the parent, upsert the
//! StatefulSet, the Service, and (when routing is enabled) the
//! VirtualService, project status from the observed children, then run
//! the idle-culling decision. Child objects are reconciled in that fixed
//! order; later steps may read what earlier steps wrote, never the other
//! way around. A non-NotFound error aborts the pass immediately; earlier
//! upserts stay in place, each being independently idempotent.

pub mod child;
pub mod service;
pub mod statefulset;
pub mod status;
pub mod virtual_service;

#[cfg(test)]
mod status_test;
#[cfg(test)]
mod virtual_service_test;

use crate::config::Config;
use crate::culler::{self, CullDecision};
use crate::error::{ControllerError, is_not_found};
use crate::metrics::Metrics;
use chrono::Utc;
use crds::Theia;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, Patch, PatchParams};
use kube::core::DynamicObject;
use kube::runtime::events::Recorder;
use kube::{Resource, ResourceExt};
use std::time::Duration;
use tracing::{debug, error, info};

/// Deterministic path prefix an instance is served under.
pub(crate) fn path_prefix(namespace: &str, name: &str) -> String {
    format!("/theia/{namespace}/{name}")
}

/// Result of one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// When set, the caller should re-run this instance after the delay.
    /// Used by the culler to poll idleness without consuming the error
    /// retry budget.
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    fn done() -> Self {
        Self::default()
    }

    fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// Reconciles Theia instances and their child objects.
pub struct Reconciler {
    pub(crate) theia_api: Api<Theia>,
    pub(crate) statefulset_api: Api<StatefulSet>,
    pub(crate) service_api: Api<Service>,
    pub(crate) pod_api: Api<Pod>,
    /// Present only when routing is enabled.
    pub(crate) virtual_service_api: Option<Api<DynamicObject>>,
    pub(crate) recorder: Recorder,
    pub(crate) config: Config,
    pub(crate) metrics: Metrics,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    #[allow(clippy::too_many_arguments, reason = "constructor wires all APIs once")]
    pub fn new(
        theia_api: Api<Theia>,
        statefulset_api: Api<StatefulSet>,
        service_api: Api<Service>,
        pod_api: Api<Pod>,
        virtual_service_api: Option<Api<DynamicObject>>,
        recorder: Recorder,
        config: Config,
        metrics: Metrics,
    ) -> Self {
        Self {
            theia_api,
            statefulset_api,
            service_api,
            pod_api,
            virtual_service_api,
            recorder,
            config,
            metrics,
        }
    }

    /// Runs one reconcile pass for the named instance.
    pub async fn reconcile_theia(&self, name: &str) -> Result<ReconcileOutcome, ControllerError> {
        let theia = match self.theia_api.get(name).await {
            Ok(theia) => theia,
            Err(e) if is_not_found(&e) => {
                // Children are garbage-collected through their owner refs.
                debug!("Theia {} is gone, nothing to reconcile", name);
                return Ok(ReconcileOutcome::done());
            }
            Err(e) => {
                error!("Unable to fetch Theia {}: {}", name, e);
                return Err(e.into());
            }
        };
        let namespace = theia.namespace().unwrap_or_else(|| "default".to_string());
        info!("Reconciling Theia {}/{}", namespace, name);

        // Reconcile StatefulSet
        let desired = statefulset::generate(&theia, &self.config);
        let observed_statefulset = child::reconcile_child(
            &self.statefulset_api,
            self.owner_ref(&theia)?,
            desired,
            statefulset::copy_managed_fields,
            &self.metrics,
            "StatefulSet",
        )
        .await?;

        // Reconcile Service
        let desired = service::generate(&theia);
        child::reconcile_child(
            &self.service_api,
            self.owner_ref(&theia)?,
            desired,
            service::copy_managed_fields,
            &self.metrics,
            "Service",
        )
        .await?;

        // Reconcile the route only when routing is enabled cluster-wide.
        if let Some(virtual_service_api) = self.virtual_service_api.as_ref() {
            let desired = virtual_service::generate(&theia, &self.config);
            child::reconcile_child(
                virtual_service_api,
                self.owner_ref(&theia)?,
                desired,
                virtual_service::copy_managed_fields,
                &self.metrics,
                "VirtualService",
            )
            .await?;
        }

        // Project status from the observed children. A missing pod is not
        // an error; the StatefulSet will create it.
        let pod = self.first_pod(&theia).await?;
        self.project_status(&theia, &observed_statefulset, pod.as_ref())
            .await?;

        // Culling never fires before the pod exists: idleness cannot be
        // evaluated on a workload that has never started.
        if pod.is_some() {
            let now = Utc::now();
            match culler::decide(
                &theia.metadata,
                now,
                self.config.cull_idle_time,
                self.config.idleness_check_period,
            ) {
                CullDecision::NeedsCull => {
                    info!(
                        "Theia {}/{} needs culling, setting stop annotation",
                        namespace, name
                    );
                    self.metrics
                        .cullings
                        .with_label_values(&[namespace.as_str(), name])
                        .inc();
                    self.theia_api
                        .patch(
                            name,
                            &PatchParams::default(),
                            &Patch::Merge(&culler::stop_patch(now)),
                        )
                        .await?;
                }
                CullDecision::AlreadyCulled => {
                    debug!("Theia {}/{} is already culled", namespace, name);
                }
                CullDecision::Active { recheck_after } => {
                    return Ok(ReconcileOutcome::requeue(recheck_after));
                }
            }
        }

        Ok(ReconcileOutcome::done())
    }

    /// Ownership linkage for generated children; cluster GC cascades
    /// through it on instance deletion.
    fn owner_ref(&self, theia: &Theia) -> Result<OwnerReference, ControllerError> {
        theia.controller_owner_ref(&()).ok_or_else(|| {
            ControllerError::Reference(format!(
                "Theia {} has no uid yet, cannot own children",
                theia.name_any()
            ))
        })
    }

    /// Fetches the instance's first pod (`<name>-0`), the one whose
    /// container state feeds status projection and whose existence gates
    /// culling.
    async fn first_pod(&self, theia: &Theia) -> Result<Option<Pod>, ControllerError> {
        let pod_name = format!("{}-0", theia.name_any());
        match self.pod_api.get(&pod_name).await {
            Ok(pod) => Ok(Some(pod)),
            Err(e) if is_not_found(&e) => {
                debug!("Pod {} not found yet", pod_name);
                Ok(None)
            }
            Err(e) => {
                error!("Error getting pod {}: {}", pod_name, e);
                Err(e.into())
            }
        }
    }
}
