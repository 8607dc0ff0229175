use std::sync::Arc;
use std::time::{Duration, Instant};

use healing_approval::{
    ApprovalConfig, ApprovalCoordinator, ApprovalError, ApprovalRequest, ApprovalStatus,
};
use healrun_core_types::{OrganizationId, ProjectId, RunId, TestId};
use healrun_event_bus::{
    BusPublisher, Channel, NoopPublisher, HEALING_APPROVAL_REQUIRED, HEALING_APPROVAL_RESOLVED,
};

fn request(step: usize) -> ApprovalRequest {
    ApprovalRequest {
        run_id: RunId::from("run-1"),
        test_id: TestId::from("test-1"),
        organization_id: OrganizationId::from("org-1"),
        project_id: ProjectId::from("proj-1"),
        step_index: step,
        original_selector: "#checkout".into(),
        suggested_selector: "visual:checkout".into(),
        strategy: "visual_match".into(),
        confidence: 0.5,
        visual_region: None,
    }
}

fn coordinator() -> ApprovalCoordinator {
    ApprovalCoordinator::new(ApprovalConfig::default(), Arc::new(NoopPublisher))
}

#[tokio::test]
async fn unanswered_approval_expires_as_rejection() {
    let coordinator = coordinator();
    let started = Instant::now();
    let handle = coordinator
        .request_approval(request(0), Some(Duration::from_millis(50)))
        .await;
    let id = handle.id().clone();

    assert!(!handle.wait().await);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(45), "expired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "expired late: {elapsed:?}");

    assert_eq!(coordinator.pending_count(), 0);
    assert_eq!(
        coordinator.resolve(&id, true, "late-reviewer").await,
        Err(ApprovalError::NotFound(id.clone()))
    );
    let logged = coordinator.get(&id).unwrap();
    assert_eq!(logged.status, ApprovalStatus::Rejected);
    assert!(logged.timed_out);
    assert!(logged.resolved_by.is_none());
}

#[tokio::test]
async fn resolve_before_timeout_cancels_timer() {
    let coordinator = coordinator();
    let handle = coordinator
        .request_approval(request(0), Some(Duration::from_millis(30)))
        .await;
    let id = handle.id().clone();
    coordinator.resolve(&id, true, "alice").await.unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(handle.wait().await);
    let logged = coordinator.get(&id).unwrap();
    assert_eq!(logged.status, ApprovalStatus::Approved);
    assert!(!logged.timed_out);
    assert_eq!(coordinator.recently_resolved().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolves_win_exactly_once() {
    let coordinator = coordinator();
    let handle = coordinator.request_approval(request(0), None).await;
    let id = handle.id().clone();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let coordinator = coordinator.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            coordinator
                .resolve(&id, i % 2 == 0, format!("user-{i}"))
                .await
                .is_ok()
        }));
    }
    let mut wins = 0;
    for task in tasks {
        if task.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
    let logged = coordinator.get(&id).unwrap();
    assert_eq!(handle.wait().await, logged.is_approved());
}

#[tokio::test]
async fn independent_approvals_do_not_interfere() {
    let coordinator = coordinator();
    let fast = coordinator
        .request_approval(request(1), Some(Duration::from_millis(20)))
        .await;
    let approved = coordinator.request_approval(request(2), None).await;
    let rejected = coordinator.request_approval(request(3), None).await;

    coordinator.resolve(approved.id(), true, "a").await.unwrap();
    coordinator.resolve(rejected.id(), false, "b").await.unwrap();

    assert!(!fast.wait().await);
    assert!(approved.wait().await);
    assert!(!rejected.wait().await);
    assert!(coordinator.list_pending(None).is_empty());
}

#[tokio::test]
async fn events_reach_run_and_organization_channels() {
    let publisher = Arc::new(BusPublisher::new(16));
    let mut rx = publisher.subscribe();
    let coordinator = ApprovalCoordinator::new(ApprovalConfig::default(), publisher.clone());

    let handle = coordinator.request_approval(request(4), None).await;
    coordinator.resolve(handle.id(), false, "reviewer").await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        let event = rx.recv().await.unwrap();
        seen.push((event.channel, event.name));
    }
    assert_eq!(
        seen,
        vec![
            (
                Channel::Run(RunId::from("run-1")),
                HEALING_APPROVAL_REQUIRED.to_string()
            ),
            (
                Channel::Organization(OrganizationId::from("org-1")),
                HEALING_APPROVAL_REQUIRED.to_string()
            ),
            (
                Channel::Run(RunId::from("run-1")),
                HEALING_APPROVAL_RESOLVED.to_string()
            ),
            (
                Channel::Organization(OrganizationId::from("org-1")),
                HEALING_APPROVAL_RESOLVED.to_string()
            ),
        ]
    );
}
