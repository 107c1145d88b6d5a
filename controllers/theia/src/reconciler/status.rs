//! Status projection.
//!
//! The Theia status is a pure projection of the observed StatefulSet and
//! its first pod; nothing here invents state. The projection itself is a
//! pure function so change detection and condition dedup are testable
//! without a cluster; the async wrapper only fetches and patches.

use super::Reconciler;
use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use crds::{ConditionKind, ContainerStateSnapshot, Theia, TheiaCondition, TheiaStatus};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ContainerState, Pod};
use kube::ResourceExt;
use kube::api::{Patch, PatchParams};
use tracing::info;

/// Classifies a container state into exactly one snapshot kind. Returns
/// `None` for a state payload with no branch set (not yet observable).
pub(crate) fn classify(state: &ContainerState) -> Option<ContainerStateSnapshot> {
    if state.running.is_some() {
        return Some(ContainerStateSnapshot {
            state: ConditionKind::Running,
            reason: String::new(),
            message: String::new(),
        });
    }
    if let Some(waiting) = state.waiting.as_ref() {
        return Some(ContainerStateSnapshot {
            state: ConditionKind::Waiting,
            reason: waiting.reason.clone().unwrap_or_default(),
            message: waiting.message.clone().unwrap_or_default(),
        });
    }
    state.terminated.as_ref().map(|terminated| {
        ContainerStateSnapshot {
            state: ConditionKind::Terminated,
            reason: terminated.reason.clone().unwrap_or_default(),
            // The termination message, not the reason; surfacing the
            // reason twice hides the actual exit detail.
            message: terminated.message.clone().unwrap_or_default(),
        }
    })
}

/// Computes the next status, or `None` when nothing changed. A condition
/// is prepended only when type, reason, or message differ from the
/// current head; the rest of the history is never rewritten.
pub(crate) fn project(
    current: &TheiaStatus,
    observed_ready: i32,
    snapshot: Option<ContainerStateSnapshot>,
    now: DateTime<Utc>,
) -> Option<TheiaStatus> {
    let mut next = current.clone();
    let mut changed = false;

    if next.ready_replicas != observed_ready {
        next.ready_replicas = observed_ready;
        changed = true;
    }

    if let Some(snapshot) = snapshot
        && next.container_state.as_ref() != Some(&snapshot)
    {
        let condition = TheiaCondition {
            condition_type: snapshot.state,
            last_probe_time: now,
            reason: snapshot.reason.clone(),
            message: snapshot.message.clone(),
        };
        let differs_from_head = next.conditions.first().is_none_or(|head| {
            head.condition_type != condition.condition_type
                || head.reason != condition.reason
                || head.message != condition.message
        });
        if differs_from_head {
            next.conditions.insert(0, condition);
        }
        next.container_state = Some(snapshot);
        changed = true;
    }

    changed.then_some(next)
}

/// Snapshot of the first container's state from the observed pod.
pub(crate) fn pod_snapshot(pod: &Pod) -> Option<ContainerStateSnapshot> {
    pod.status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
        .and_then(|statuses| statuses.first())
        .and_then(|status| status.state.as_ref())
        .and_then(classify)
}

impl Reconciler {
    /// Projects observed child state onto the Theia status and persists
    /// it via the status subresource, once, only when something changed.
    pub(crate) async fn project_status(
        &self,
        theia: &Theia,
        observed: &StatefulSet,
        pod: Option<&Pod>,
    ) -> Result<(), ControllerError> {
        let name = theia.name_any();
        let namespace = theia.namespace().unwrap_or_else(|| "default".to_string());

        let observed_ready = observed
            .status
            .as_ref()
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0);
        let snapshot = pod.and_then(pod_snapshot);
        let current = theia.status.clone().unwrap_or_default();

        let Some(next) = project(&current, observed_ready, snapshot, Utc::now()) else {
            return Ok(());
        };
        info!("Updating status of Theia {}/{}", namespace, name);
        let patch = serde_json::json!({ "status": next });
        self.theia_api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
