//! StatefulSet generation and managed-field reconciliation.

use super::child::merge_string_map;
use super::path_prefix;
use crate::config::Config;
use crate::culler;
use crds::{THEIA_NAME_LABEL, Theia};
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PodSecurityContext, PodTemplateSpec,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Default port the IDE listens on inside the container.
pub const DEFAULT_CONTAINER_PORT: i32 = 3000;

/// Default fsGroup set on the pod security context.
pub const DEFAULT_FS_GROUP: i64 = 100;

/// Default working directory inside the container.
pub const DEFAULT_WORKING_DIR: &str = "/home/theia";

/// Mount path of the instance's project volume.
pub const DEFAULT_MOUNT_PATH: &str = "/home/project";

/// Default image when the spec supplies none.
pub const DEFAULT_IMAGE: &str = "theiaide/theia:latest";

/// Name shared by the generated volume claim and its mount.
const VOLUME_NAME: &str = "theia";

/// First configured container port, or the default. The Service targets
/// this port.
pub(crate) fn container_port(theia: &Theia) -> i32 {
    theia
        .spec
        .template
        .spec
        .containers
        .first()
        .and_then(|c| c.ports.as_ref())
        .and_then(|ports| ports.first())
        .map_or(DEFAULT_CONTAINER_PORT, |p| p.container_port)
}

/// Labels stamped on the generated pod template. All instance labels are
/// copied on top so policy labels set by other controllers propagate.
fn pod_labels(theia: &Theia, name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([
        ("statefulset".to_string(), name.to_string()),
        (THEIA_NAME_LABEL.to_string(), name.to_string()),
        ("app".to_string(), "theia.e2.fyi".to_string()),
        ("version".to_string(), "v1alpha1".to_string()),
    ]);
    for (key, value) in theia.labels() {
        labels.insert(key.clone(), value.clone());
    }
    labels
}

/// Renders the desired StatefulSet for an instance. Pure: reads only the
/// instance spec and start-time configuration.
pub(crate) fn generate(theia: &Theia, config: &Config) -> StatefulSet {
    let name = theia.name_any();
    let namespace = theia.namespace().unwrap_or_else(|| "default".to_string());
    let replicas = if culler::stop_annotation_is_set(&theia.metadata) {
        0
    } else {
        1
    };

    let mut pod_spec = theia.spec.template.spec.clone();
    if pod_spec.containers.is_empty() {
        pod_spec.containers.push(Container {
            name: name.clone(),
            ..Default::default()
        });
    }
    if let Some(container) = pod_spec.containers.first_mut() {
        if container.image.is_none() {
            container.image = Some(DEFAULT_IMAGE.to_string());
        }
        if container.working_dir.is_none() {
            container.working_dir = Some(DEFAULT_WORKING_DIR.to_string());
        }
        if container.ports.is_none() {
            container.ports = Some(vec![ContainerPort {
                container_port: DEFAULT_CONTAINER_PORT,
                name: Some("theia-port".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]);
        }
        let env = container.env.get_or_insert_default();
        env.push(EnvVar {
            name: "THEIA_NAME".to_string(),
            value: Some(name.clone()),
            ..Default::default()
        });
        env.push(EnvVar {
            name: "THEIA_PREFIX".to_string(),
            value: Some(path_prefix(&namespace, &name)),
            ..Default::default()
        });
        env.push(EnvVar {
            name: "NAMESPACE".to_string(),
            value: Some(namespace.clone()),
            ..Default::default()
        });
        container
            .volume_mounts
            .get_or_insert_default()
            .push(VolumeMount {
                name: VOLUME_NAME.to_string(),
                mount_path: DEFAULT_MOUNT_PATH.to_string(),
                ..Default::default()
            });
    }

    // Some platforms (like OpenShift) reject a preset fsGroup; the flag
    // lets their policy controller pick one instead. A caller-supplied
    // security context always wins.
    if config.add_fsgroup && pod_spec.security_context.is_none() {
        pod_spec.security_context = Some(PodSecurityContext {
            fs_group: Some(DEFAULT_FS_GROUP),
            ..Default::default()
        });
    }

    let annotations = theia
        .spec
        .template
        .metadata
        .as_ref()
        .map(|m| m.annotations.clone())
        .filter(|a| !a.is_empty());

    let volume_claim_templates = theia
        .spec
        .template
        .persistent_volume_claim_spec
        .as_ref()
        .filter(|pvc| pvc.storage_class_name.is_some())
        .map(|pvc| {
            vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(VOLUME_NAME.to_string()),
                    ..Default::default()
                },
                spec: Some(pvc.clone()),
                ..Default::default()
            }]
        });

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    "statefulset".to_string(),
                    name.clone(),
                )])),
                ..Default::default()
            },
            service_name: Some(name.clone()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels(theia, &name)),
                    annotations,
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            volume_claim_templates,
            ..Default::default()
        }),
        status: None,
    }
}

/// Copies the managed StatefulSet fields onto the observed object,
/// reporting whether anything changed. Selector and volume claim
/// templates are immutable on the cluster side and left alone; everything
/// the controller does not derive (cluster metadata, foreign annotations,
/// status, server-side template defaults) survives untouched.
pub(crate) fn copy_managed_fields(desired: &StatefulSet, observed: &mut StatefulSet) -> bool {
    let mut changed = merge_string_map(
        desired.metadata.labels.as_ref(),
        &mut observed.metadata.labels,
    );
    match (desired.spec.as_ref(), observed.spec.as_mut()) {
        (Some(desired_spec), Some(observed_spec)) => {
            if desired_spec.replicas != observed_spec.replicas {
                observed_spec.replicas = desired_spec.replicas;
                changed = true;
            }
            changed |= copy_pod_template(&desired_spec.template, &mut observed_spec.template);
        }
        (Some(_), None) => {
            observed.spec = desired.spec.clone();
            changed = true;
        }
        _ => {}
    }
    changed
}

/// Converges the template fields the generator controls, leaving
/// server-defaulted template fields (restart policy, DNS policy, ...) as
/// observed.
fn copy_pod_template(desired: &PodTemplateSpec, observed: &mut PodTemplateSpec) -> bool {
    let mut changed = false;

    if let Some(desired_meta) = desired.metadata.as_ref() {
        let observed_meta = observed.metadata.get_or_insert_default();
        changed |= merge_string_map(desired_meta.labels.as_ref(), &mut observed_meta.labels);
        changed |= merge_string_map(
            desired_meta.annotations.as_ref(),
            &mut observed_meta.annotations,
        );
    }

    let Some(desired_spec) = desired.spec.as_ref() else {
        return changed;
    };
    let observed_spec = observed.spec.get_or_insert_default();

    if desired_spec.security_context.is_some()
        && desired_spec.security_context != observed_spec.security_context
    {
        observed_spec.security_context = desired_spec.security_context.clone();
        changed = true;
    }

    match (
        desired_spec.containers.first(),
        observed_spec.containers.first_mut(),
    ) {
        (Some(desired_c), Some(observed_c)) => {
            if desired_c.image != observed_c.image {
                observed_c.image = desired_c.image.clone();
                changed = true;
            }
            if desired_c.working_dir != observed_c.working_dir {
                observed_c.working_dir = desired_c.working_dir.clone();
                changed = true;
            }
            if desired_c.ports != observed_c.ports {
                observed_c.ports = desired_c.ports.clone();
                changed = true;
            }
            if desired_c.env != observed_c.env {
                observed_c.env = desired_c.env.clone();
                changed = true;
            }
            if desired_c.volume_mounts != observed_c.volume_mounts {
                observed_c.volume_mounts = desired_c.volume_mounts.clone();
                changed = true;
            }
        }
        (Some(_), None) => {
            observed_spec.containers = desired_spec.containers.clone();
            changed = true;
        }
        _ => {}
    }

    changed
}
