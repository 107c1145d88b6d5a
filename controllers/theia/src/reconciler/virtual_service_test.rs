//! Unit tests for VirtualService generation and managed-field copy

use super::virtual_service::{copy_managed_fields, generate, route_name};
use crate::config::Config;
use crate::test_utils::make_theia;
use serde_json::json;

#[test]
fn route_name_composes_version_namespace_and_name() {
    assert_eq!(route_name("workspaces", "alice"), "v1alpha1-workspaces-alice");
}

#[test]
fn generated_route_matches_prefix_and_rewrites_to_root() {
    let theia = make_theia("alice", "workspaces");
    let route = generate(&theia, &Config::default());

    assert_eq!(
        route.metadata.name.as_deref(),
        Some("v1alpha1-workspaces-alice")
    );
    assert_eq!(route.metadata.namespace.as_deref(), Some("workspaces"));

    let spec = route.data.get("spec").expect("spec payload");
    assert_eq!(spec["hosts"], json!(["*"]));
    assert_eq!(spec["gateways"], json!(["theia-system/theia-gateway"]));

    let http = &spec["http"][0];
    assert_eq!(
        http["match"][0]["uri"]["prefix"],
        json!("/theia/workspaces/alice/")
    );
    assert_eq!(http["rewrite"]["uri"], json!("/"));
    assert_eq!(
        http["route"][0]["destination"]["host"],
        json!("alice.workspaces.svc.cluster.local")
    );
    assert_eq!(http["route"][0]["destination"]["port"]["number"], json!(80));
    assert_eq!(http["timeout"], json!("300s"));
}

#[test]
fn generated_route_uses_configured_gateway() {
    let theia = make_theia("alice", "workspaces");
    let config = Config {
        routing_gateway: "edge/public-gateway".to_string(),
        ..Config::default()
    };
    let route = generate(&theia, &config);
    assert_eq!(
        route.data["spec"]["gateways"],
        json!(["edge/public-gateway"])
    );
}

#[test]
fn copy_is_a_no_op_when_converged() {
    let theia = make_theia("alice", "workspaces");
    let desired = generate(&theia, &Config::default());
    let mut observed = desired.clone();
    observed.metadata.resource_version = Some("99".to_string());

    assert!(!copy_managed_fields(&desired, &mut observed));
}

#[test]
fn copy_restores_hand_edited_spec_and_keeps_foreign_metadata() {
    let theia = make_theia("alice", "workspaces");
    let desired = generate(&theia, &Config::default());
    let mut observed = desired.clone();
    observed.data["spec"]["http"][0]["timeout"] = json!("10s");
    observed
        .metadata
        .annotations
        .get_or_insert_default()
        .insert("external".to_string(), "kept".to_string());

    assert!(copy_managed_fields(&desired, &mut observed));
    assert_eq!(observed.data["spec"]["http"][0]["timeout"], json!("300s"));
    assert_eq!(
        observed
            .metadata
            .annotations
            .as_ref()
            .expect("annotations")
            .get("external")
            .map(String::as_str),
        Some("kept")
    );
}
