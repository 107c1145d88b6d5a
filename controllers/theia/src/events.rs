//! Event relay.
//!
//! Cluster events whose involved object belongs to a Theia instance (the
//! instance's StatefulSet, or one of its pods) are re-emitted on the
//! instance itself so users see child failures without digging into the
//! generated objects.

use crate::error::{ControllerError, is_not_found};
use crate::reconciler::Reconciler;
use crds::THEIA_NAME_LABEL;
use k8s_openapi::api::core::v1::Event as CoreEvent;
use kube::Resource;
use kube::runtime::events::{Event as PublishedEvent, EventType};
use tracing::{debug, error};

/// Workload an event resolves to, before any cluster lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvolvedWorkload {
    /// The instance's StatefulSet; its name is the parent's name.
    StatefulSet(String),
    /// A pod; the parent name is carried on a pod label.
    Pod(String),
}

/// Eligibility filter, applied before any lookup: only StatefulSet and
/// Pod events can belong to a Theia.
pub fn involved_workload(event: &CoreEvent) -> Option<InvolvedWorkload> {
    let name = event.involved_object.name.clone()?;
    match event.involved_object.kind.as_deref() {
        Some("StatefulSet") => Some(InvolvedWorkload::StatefulSet(name)),
        Some("Pod") => Some(InvolvedWorkload::Pod(name)),
        _ => None,
    }
}

impl Reconciler {
    /// Maps an event's involved object to the owning Theia's name.
    async fn resolve_parent(&self, event: &CoreEvent) -> Result<String, ControllerError> {
        match involved_workload(event) {
            None => Err(ControllerError::Resolution(
                "event does not involve a StatefulSet or Pod".to_string(),
            )),
            Some(InvolvedWorkload::StatefulSet(name)) => Ok(name),
            Some(InvolvedWorkload::Pod(name)) => {
                let pod = match self.pod_api.get(&name).await {
                    Ok(pod) => pod,
                    Err(e) if is_not_found(&e) => {
                        return Err(ControllerError::Resolution(format!(
                            "pod {name} no longer exists"
                        )));
                    }
                    Err(e) => return Err(e.into()),
                };
                pod.metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(THEIA_NAME_LABEL))
                    .cloned()
                    .ok_or_else(|| {
                        ControllerError::Resolution(format!(
                            "pod {name} carries no {THEIA_NAME_LABEL} label"
                        ))
                    })
            }
        }
    }

    /// Relays one eligible event onto its owning Theia. Returns the parent
    /// name when a relay happened so the caller can reconcile it; events
    /// that cannot be resolved are dropped, not retried, since a retry
    /// cannot change the outcome.
    pub async fn relay_event(&self, event: &CoreEvent) -> Result<Option<String>, ControllerError> {
        let parent = match self.resolve_parent(event).await {
            Ok(parent) => parent,
            Err(ControllerError::Resolution(reason)) => {
                debug!("Dropping event: {}", reason);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let theia = match self.theia_api.get(&parent).await {
            Ok(theia) => theia,
            Err(e) if is_not_found(&e) => {
                debug!("Dropping event: Theia {} not found", parent);
                return Ok(None);
            }
            Err(e) => {
                error!("Unable to fetch Theia {} for event relay: {}", parent, e);
                return Err(e.into());
            }
        };

        let kind = event
            .involved_object
            .kind
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        let involved_name = event.involved_object.name.as_deref().unwrap_or_default();
        let reissued = PublishedEvent {
            type_: match event.type_.as_deref() {
                Some("Warning") => EventType::Warning,
                _ => EventType::Normal,
            },
            reason: event.reason.clone().unwrap_or_default(),
            note: Some(format!(
                "Reissued from {}/{}: {}",
                kind,
                involved_name,
                event.message.as_deref().unwrap_or_default()
            )),
            action: "Reissue".to_string(),
            secondary: None,
        };
        self.recorder
            .publish(&reissued, &theia.object_ref(&()))
            .await?;
        debug!(
            "Relayed event from {}/{} onto Theia {}",
            kind, involved_name, parent
        );
        Ok(Some(parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ObjectReference;

    fn event_for(kind: Option<&str>, name: Option<&str>) -> CoreEvent {
        CoreEvent {
            involved_object: ObjectReference {
                kind: kind.map(String::from),
                name: name.map(String::from),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn only_workload_and_pod_events_are_eligible() {
        assert_eq!(
            involved_workload(&event_for(Some("StatefulSet"), Some("alice"))),
            Some(InvolvedWorkload::StatefulSet("alice".to_string()))
        );
        assert_eq!(
            involved_workload(&event_for(Some("Pod"), Some("alice-0"))),
            Some(InvolvedWorkload::Pod("alice-0".to_string()))
        );
        assert_eq!(
            involved_workload(&event_for(Some("ConfigMap"), Some("alice"))),
            None
        );
        assert_eq!(involved_workload(&event_for(None, Some("alice"))), None);
        assert_eq!(involved_workload(&event_for(Some("Pod"), None)), None);
    }
}
