//! Generic child-object upsert engine.
//!
//! One routine drives every child kind: fetch by name, create when absent,
//! otherwise copy the managed fields and write back only when something
//! changed. Per-kind behavior is confined to the desired-state generator
//! and the managed-field copy function, so adding a child kind never
//! touches the pass orchestration.

use crate::error::{ControllerError, is_not_found};
use crate::metrics::Metrics;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube::api::{Api, PostParams};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, error, info};

/// Converges one child object onto its desired state and returns the
/// observed (or just-created) object for later steps to read.
///
/// The copy function receives `(desired, observed)` and mutates only the
/// managed fields on the observed object, reporting whether anything
/// changed; unmanaged fields (cluster metadata, foreign annotations,
/// status) survive the write untouched. When nothing changed, no write is
/// issued at all.
pub(crate) async fn reconcile_child<K, F>(
    api: &Api<K>,
    owner_ref: OwnerReference,
    mut desired: K,
    copy_managed: F,
    metrics: &Metrics,
    kind: &str,
) -> Result<K, ControllerError>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned,
    F: Fn(&K, &mut K) -> bool,
{
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| ControllerError::Reference(format!("generated {kind} has no name")))?;
    let namespace = desired.meta().namespace.clone().unwrap_or_default();
    desired.meta_mut().owner_references = Some(vec![owner_ref]);

    match api.get(&name).await {
        Err(e) if is_not_found(&e) => {
            info!("Creating {} {}/{}", kind, namespace, name);
            metrics
                .creations
                .with_label_values(&[namespace.as_str()])
                .inc();
            match api.create(&PostParams::default(), &desired).await {
                Ok(created) => Ok(created),
                Err(e) => {
                    error!("Unable to create {} {}/{}: {}", kind, namespace, name, e);
                    metrics
                        .creation_failures
                        .with_label_values(&[namespace.as_str()])
                        .inc();
                    Err(e.into())
                }
            }
        }
        Err(e) => {
            error!("Error getting {} {}/{}: {}", kind, namespace, name, e);
            Err(e.into())
        }
        Ok(mut observed) => {
            if copy_managed(&desired, &mut observed) {
                info!("Updating {} {}/{}", kind, namespace, name);
                match api.replace(&name, &PostParams::default(), &observed).await {
                    Ok(updated) => Ok(updated),
                    Err(e) => {
                        error!("Unable to update {} {}/{}: {}", kind, namespace, name, e);
                        Err(e.into())
                    }
                }
            } else {
                debug!("{} {}/{} already up to date", kind, namespace, name);
                Ok(observed)
            }
        }
    }
}

/// Merges the desired entries into an observed label/annotation map,
/// leaving entries the controller does not manage in place. Returns
/// whether anything changed.
pub(crate) fn merge_string_map(
    desired: Option<&BTreeMap<String, String>>,
    observed: &mut Option<BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return false;
    };
    if desired.is_empty() {
        return false;
    }
    let target = observed.get_or_insert_default();
    let mut changed = false;
    for (key, value) in desired {
        if target.get(key) != Some(value) {
            target.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}
