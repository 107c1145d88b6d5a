//! Theia CRD
//!
//! A per-user Theia IDE instance. The controller derives a StatefulSet,
//! a Service, and (optionally) an Istio VirtualService from this resource.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{PersistentVolumeClaimSpec, PodSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation set by the culler when an instance is scaled to zero.
/// Its value is the RFC 3339 timestamp of the culling decision. Only an
/// external actor (e.g. the user re-opening the IDE) removes it.
pub const STOP_ANNOTATION: &str = "theia.e2.fyi/stopped";

/// Annotation carrying the last observed activity timestamp (RFC 3339).
pub const LAST_ACTIVITY_ANNOTATION: &str = "theia.e2.fyi/last-activity";

/// Label linking a generated pod back to its owning Theia instance.
pub const THEIA_NAME_LABEL: &str = "theia-name";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "e2.fyi",
    version = "v1alpha1",
    kind = "Theia",
    namespaced,
    status = "TheiaStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct TheiaSpec {
    /// Pod template for the IDE workload. Unset container fields are
    /// defaulted by the controller at generation time.
    pub template: TheiaTemplateSpec,
}

/// Pod-template-like spec carried by a Theia instance.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TheiaTemplateSpec {
    /// Metadata copied onto the generated pod template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TheiaTemplateMetadata>,

    /// Pod spec for the instance. Must contain at least one container.
    #[schemars(schema_with = "preserve_unknown_object")]
    pub spec: PodSpec,

    /// Storage claim template. A volume claim named `theia` is generated
    /// only when `storageClassName` is set here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_object")]
    pub persistent_volume_claim_spec: Option<PersistentVolumeClaimSpec>,
}

/// Subset of pod template metadata a user may set on the instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TheiaTemplateMetadata {
    /// Annotations propagated to the generated pod template.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Status projected from the observed StatefulSet and its first pod.
/// Never mutated independently of observed child state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TheiaStatus {
    /// Ready replica count mirrored from the StatefulSet.
    #[serde(default)]
    pub ready_replicas: i32,

    /// Last observed classification of the first container's state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_state: Option<ContainerStateSnapshot>,

    /// Condition history, newest first. A record is prepended only when
    /// type, reason, or message differ from the current head.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<TheiaCondition>,
}

/// One observed container-state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TheiaCondition {
    /// Classified container state.
    #[serde(rename = "type")]
    pub condition_type: ConditionKind,

    /// When this condition was observed.
    pub last_probe_time: DateTime<Utc>,

    /// Reason reported by the container runtime, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message reported by the container runtime, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Classification of a container state into exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionKind {
    /// Container is running.
    Running,
    /// Container is waiting to start.
    Waiting,
    /// Container has terminated.
    Terminated,
}

/// Snapshot of the first container's state, used for change detection
/// between reconcile passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStateSnapshot {
    /// Classified state.
    pub state: ConditionKind,

    /// Reason from the waiting/terminated payload, empty for running.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Message from the waiting/terminated payload, empty for running.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Schema for embedded k8s-openapi types, which do not implement
/// `JsonSchema`. The server-side schema is left open; validation of these
/// fields belongs to the API server's native types.
fn preserve_unknown_object(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
