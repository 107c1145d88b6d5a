//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up
//! test scenarios.

use crds::{Theia, TheiaSpec, TheiaTemplateSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerState, ContainerStatus, Pod, PodSpec, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Minimal Theia instance: one unconfigured container, a uid so owner
/// references can be built.
pub fn make_theia(name: &str, namespace: &str) -> Theia {
    Theia {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some("00000000-feed-face-0000-000000000000".to_string()),
            ..Default::default()
        },
        spec: TheiaSpec {
            template: TheiaTemplateSpec {
                metadata: None,
                spec: PodSpec {
                    containers: vec![Container {
                        name: "theia".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                persistent_volume_claim_spec: None,
            },
        },
        status: None,
    }
}

/// Adds labels to an instance's metadata.
pub fn with_labels(mut theia: Theia, labels: &[(&str, &str)]) -> Theia {
    let map: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    theia.metadata.labels = Some(map);
    theia
}

/// Adds an annotation to an instance's metadata.
pub fn with_annotation(mut theia: Theia, key: &str, value: &str) -> Theia {
    theia
        .metadata
        .annotations
        .get_or_insert_default()
        .insert(key.to_string(), value.to_string());
    theia
}

/// A pod whose first container reports the given state.
pub fn pod_with_state(name: &str, state: ContainerState) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: "theia".to_string(),
                state: Some(state),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
