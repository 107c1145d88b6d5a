//! Idle-culling decision logic.
//!
//! Culling scales an unused instance to zero by stamping a stop annotation
//! on it; the desired-state generator then renders zero replicas. The
//! decision itself is a pure function of metadata and the clock, so it is
//! unit-testable without a cluster.

use chrono::{DateTime, TimeDelta, Utc};
use crds::{LAST_ACTIVITY_ANNOTATION, STOP_ANNOTATION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::time::Duration;

/// Outcome of one culling evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CullDecision {
    /// Instance is idle and carries no stop annotation yet: stamp it.
    NeedsCull,
    /// Stop annotation already present. Terminal until an external actor
    /// clears the annotation; no automatic un-cull exists.
    AlreadyCulled,
    /// Not idle yet: re-evaluate after the configured interval.
    Active {
        /// Delay until the next idleness check.
        recheck_after: Duration,
    },
}

/// Whether the stop annotation is present.
pub fn stop_annotation_is_set(meta: &ObjectMeta) -> bool {
    meta.annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(STOP_ANNOTATION))
}

/// Merge patch stamping the stop annotation with the decision timestamp.
/// The culler is the only producer of this annotation; applying it as a
/// patch avoids conflicting with the status write earlier in the pass.
pub fn stop_patch(now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "annotations": {
                STOP_ANNOTATION: now.to_rfc3339(),
            }
        }
    })
}

/// Last observed activity: the activity annotation when present and
/// parseable, otherwise the creation timestamp.
pub fn last_activity(meta: &ObjectMeta) -> Option<DateTime<Utc>> {
    let annotated = meta
        .annotations
        .as_ref()
        .and_then(|a| a.get(LAST_ACTIVITY_ANNOTATION))
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc));
    annotated.or_else(|| meta.creation_timestamp.as_ref().map(|t| t.0))
}

/// Idle predicate: true once the idle window has fully elapsed since the
/// last activity. With no activity signal at all the instance is treated
/// as not idle.
pub fn is_idle(meta: &ObjectMeta, now: DateTime<Utc>, idle_after: Duration) -> bool {
    let Some(last) = last_activity(meta) else {
        return false;
    };
    let threshold = TimeDelta::from_std(idle_after).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(last) >= threshold
}

/// Runs the culling state machine for one pass. Callers must ensure the
/// instance's pod exists before asking; idleness is meaningless for a
/// workload that has never started.
pub fn decide(
    meta: &ObjectMeta,
    now: DateTime<Utc>,
    idle_after: Duration,
    recheck_after: Duration,
) -> CullDecision {
    if stop_annotation_is_set(meta) {
        return CullDecision::AlreadyCulled;
    }
    if is_idle(meta, now, idle_after) {
        return CullDecision::NeedsCull;
    }
    CullDecision::Active { recheck_after }
}
