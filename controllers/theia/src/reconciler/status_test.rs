//! Unit tests for status projection and condition dedup

use super::status::{classify, pod_snapshot, project};
use crate::test_utils::pod_with_state;
use chrono::Utc;
use crds::{ConditionKind, ContainerStateSnapshot, TheiaStatus};
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStateWaiting,
};

fn running() -> ContainerState {
    ContainerState {
        running: Some(ContainerStateRunning::default()),
        ..Default::default()
    }
}

fn waiting(reason: &str, message: &str) -> ContainerState {
    ContainerState {
        waiting: Some(ContainerStateWaiting {
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }),
        ..Default::default()
    }
}

fn terminated(reason: &str, message: &str) -> ContainerState {
    ContainerState {
        terminated: Some(ContainerStateTerminated {
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn classification_picks_exactly_one_kind() {
    let snapshot = classify(&running()).expect("classified");
    assert_eq!(snapshot.state, ConditionKind::Running);
    assert!(snapshot.reason.is_empty());

    let snapshot = classify(&waiting("CrashLoopBackOff", "back-off 5m")).expect("classified");
    assert_eq!(snapshot.state, ConditionKind::Waiting);
    assert_eq!(snapshot.reason, "CrashLoopBackOff");
    assert_eq!(snapshot.message, "back-off 5m");

    assert!(classify(&ContainerState::default()).is_none());
}

#[test]
fn terminated_message_comes_from_the_message_field() {
    let snapshot = classify(&terminated("OOMKilled", "memory limit exceeded")).expect("classified");
    assert_eq!(snapshot.state, ConditionKind::Terminated);
    assert_eq!(snapshot.reason, "OOMKilled");
    assert_eq!(snapshot.message, "memory limit exceeded");
}

#[test]
fn ready_replica_drift_is_projected() {
    let current = TheiaStatus::default();
    let next = project(&current, 1, None, Utc::now()).expect("changed");
    assert_eq!(next.ready_replicas, 1);
    assert!(next.conditions.is_empty());
}

#[test]
fn unchanged_observation_projects_nothing() {
    let current = TheiaStatus {
        ready_replicas: 1,
        ..Default::default()
    };
    assert!(project(&current, 1, None, Utc::now()).is_none());
}

#[test]
fn same_classification_twice_yields_one_condition() {
    let current = TheiaStatus::default();
    let snapshot = classify(&running()).expect("classified");

    let after_first = project(&current, 1, Some(snapshot.clone()), Utc::now()).expect("changed");
    assert_eq!(after_first.conditions.len(), 1);
    assert_eq!(
        after_first.conditions[0].condition_type,
        ConditionKind::Running
    );

    // The same observation again: no new record, no write at all.
    assert!(project(&after_first, 1, Some(snapshot), Utc::now()).is_none());
}

#[test]
fn transition_prepends_newest_first() {
    let current = TheiaStatus::default();
    let running_snapshot = classify(&running()).expect("classified");
    let after_running =
        project(&current, 1, Some(running_snapshot), Utc::now()).expect("changed");

    let crash_snapshot = classify(&terminated("Error", "exit status 1")).expect("classified");
    let after_crash =
        project(&after_running, 0, Some(crash_snapshot), Utc::now()).expect("changed");

    assert_eq!(after_crash.ready_replicas, 0);
    assert_eq!(after_crash.conditions.len(), 2);
    assert_eq!(
        after_crash.conditions[0].condition_type,
        ConditionKind::Terminated
    );
    assert_eq!(after_crash.conditions[0].message, "exit status 1");
    assert_eq!(
        after_crash.conditions[1].condition_type,
        ConditionKind::Running
    );
}

#[test]
fn matching_head_suppresses_duplicate_record() {
    // The head already describes this state; only the snapshot field is
    // brought up to date.
    let running_snapshot = ContainerStateSnapshot {
        state: ConditionKind::Running,
        reason: String::new(),
        message: String::new(),
    };
    let current = project(
        &TheiaStatus::default(),
        1,
        Some(running_snapshot.clone()),
        Utc::now(),
    )
    .expect("changed");
    let mut stale = current.clone();
    stale.container_state = None;

    let next = project(&stale, 1, Some(running_snapshot), Utc::now()).expect("changed");
    assert_eq!(next.conditions.len(), 1);
    assert!(next.container_state.is_some());
}

#[test]
fn pod_snapshot_reads_the_first_container() {
    let pod = pod_with_state("alice-0", waiting("ImagePullBackOff", "pull failed"));
    let snapshot = pod_snapshot(&pod).expect("snapshot");
    assert_eq!(snapshot.state, ConditionKind::Waiting);
    assert_eq!(snapshot.reason, "ImagePullBackOff");

    let bare = k8s_openapi::api::core::v1::Pod::default();
    assert!(pod_snapshot(&bare).is_none());
}
