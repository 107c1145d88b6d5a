//! Istio VirtualService generation and managed-field reconciliation.
//!
//! The route is an unstructured object from this controller's point of
//! view (the Istio types are not vendored), so it is handled as a
//! [`DynamicObject`] whose `spec` payload is the managed field.

use super::path_prefix;
use super::service::DEFAULT_SERVING_PORT;
use crate::config::Config;
use crds::Theia;
use kube::ResourceExt;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::{Value, json};

/// Request timeout applied to the route.
const ROUTE_TIMEOUT: &str = "300s";

/// Istio VirtualService API coordinates.
pub(crate) fn api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "networking.istio.io",
        "v1alpha3",
        "VirtualService",
    ))
}

/// Route object name: version tag, namespace, instance name.
pub(crate) fn route_name(namespace: &str, name: &str) -> String {
    format!("v1alpha1-{namespace}-{name}")
}

/// Renders the desired VirtualService for an instance. Pure: reads only
/// the instance spec and start-time configuration.
pub(crate) fn generate(theia: &Theia, config: &Config) -> DynamicObject {
    let name = theia.name_any();
    let namespace = theia.namespace().unwrap_or_else(|| "default".to_string());
    let service_host = format!("{name}.{namespace}.svc.cluster.local");

    let spec = json!({
        "hosts": ["*"],
        "gateways": [config.routing_gateway],
        "http": [{
            "match": [{ "uri": { "prefix": format!("{}/", path_prefix(&namespace, &name)) } }],
            "rewrite": { "uri": "/" },
            "route": [{
                "destination": {
                    "host": service_host,
                    "port": { "number": DEFAULT_SERVING_PORT },
                }
            }],
            "timeout": ROUTE_TIMEOUT,
        }],
    });

    let mut route =
        DynamicObject::new(&route_name(&namespace, &name), &api_resource()).within(&namespace);
    route.data = json!({ "spec": spec });
    route
}

/// Copies the managed `spec` payload onto the observed route, reporting
/// whether it changed. Metadata added by other actors stays as observed.
pub(crate) fn copy_managed_fields(desired: &DynamicObject, observed: &mut DynamicObject) -> bool {
    let desired_spec = desired.data.get("spec");
    if observed.data.get("spec") == desired_spec {
        return false;
    }
    let Some(desired_spec) = desired_spec.cloned() else {
        return false;
    };
    match &mut observed.data {
        Value::Object(map) => {
            map.insert("spec".to_string(), desired_spec);
        }
        other => {
            *other = json!({ "spec": desired_spec });
        }
    }
    true
}
