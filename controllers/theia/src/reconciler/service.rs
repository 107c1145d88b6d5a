//! Service generation and managed-field reconciliation.

use super::child::merge_string_map;
use super::statefulset::container_port;
use crds::Theia;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Port the Service exposes; the route and users always talk to this one.
pub const DEFAULT_SERVING_PORT: i32 = 80;

/// Renders the desired Service for an instance. Pure: reads only the
/// instance spec.
pub(crate) fn generate(theia: &Theia) -> Service {
    let name = theia.name_any();
    let namespace = theia.namespace().unwrap_or_else(|| "default".to_string());

    Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace),
            labels: theia.metadata.labels.clone(),
            annotations: theia.metadata.annotations.clone(),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(BTreeMap::from([(
                "statefulset".to_string(),
                name.clone(),
            )])),
            ports: Some(vec![ServicePort {
                // Port name follows the Istio convention so the route can
                // be managed by istio rbac
                name: Some(format!("http-{name}")),
                port: DEFAULT_SERVING_PORT,
                target_port: Some(IntOrString::Int(container_port(theia))),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Copies the managed Service fields onto the observed object, reporting
/// whether anything changed. The cluster-assigned `clusterIP` and any
/// foreign metadata stay as observed.
pub(crate) fn copy_managed_fields(desired: &Service, observed: &mut Service) -> bool {
    let mut changed = merge_string_map(
        desired.metadata.labels.as_ref(),
        &mut observed.metadata.labels,
    );
    changed |= merge_string_map(
        desired.metadata.annotations.as_ref(),
        &mut observed.metadata.annotations,
    );
    match (desired.spec.as_ref(), observed.spec.as_mut()) {
        (Some(desired_spec), Some(observed_spec)) => {
            if desired_spec.selector != observed_spec.selector {
                observed_spec.selector = desired_spec.selector.clone();
                changed = true;
            }
            if desired_spec.ports != observed_spec.ports {
                observed_spec.ports = desired_spec.ports.clone();
                changed = true;
            }
        }
        (Some(_), None) => {
            observed.spec = desired.spec.clone();
            changed = true;
        }
        _ => {}
    }
    changed
}
