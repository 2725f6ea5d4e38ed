//! End-to-end placement cycles against an in-memory cluster.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use gangway_framework::cycle_state::CycleState;
use gangway_framework::group::PodGroup;
use gangway_framework::node::NodeSnapshot;
use gangway_framework::plugin::{PermitPlugin, Plugin, PreFilterPlugin};
use gangway_framework::pod::{
    Container, PodInfo, QueuedPodInfo, POD_GROUP_NAME_ANNOTATION_KEY,
};
use gangway_framework::resource::Resource;
use gangway_framework::status::Status;
use gangway_framework::unit::SchedulingUnit;
use gangway_framework::CycleContext;
use gangway_plugins::Fit;
use gangway_scheduler::{
    build_registry, default_profile, Decision, PluginRegistry, RecordingSink, Scheduler,
    UnitOutcome, ERR_REASON_NO_NODES,
};

fn resources(milli_cpu: i64, memory: i64) -> Resource {
    Resource {
        milli_cpu,
        memory,
        allowed_pod_number: 110,
        ..Default::default()
    }
}

fn node(name: &str, milli_cpu: i64, memory: i64) -> NodeSnapshot {
    NodeSnapshot::new(name, resources(milli_cpu, memory), resources(milli_cpu, memory))
}

fn pod(name: &str, uid: &str, milli_cpu: i64, memory: i64) -> PodInfo {
    let mut pod = PodInfo::new("default", name, uid);
    pod.containers = vec![Container {
        name: "main".to_string(),
        requests: Resource {
            milli_cpu,
            memory,
            ..Default::default()
        },
    }];
    pod
}

fn gang_pod(group: &str, uid: &str, milli_cpu: i64) -> PodInfo {
    let mut pod = pod(uid, uid, milli_cpu, 1);
    pod.namespace = "ml".to_string();
    pod.annotations
        .insert(POD_GROUP_NAME_ANNOTATION_KEY.to_string(), group.to_string());
    pod
}

fn default_scheduler() -> (Arc<Scheduler>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let registry = build_registry(&default_profile()).unwrap();
    let scheduler = Arc::new(Scheduler::new(registry, sink.clone()));
    (scheduler, sink)
}

async fn pop_unit(scheduler: &Scheduler) -> SchedulingUnit {
    scheduler
        .queue()
        .try_pop()
        .await
        .expect("a ready unit should be queued")
}

fn bind_decisions(sink: &RecordingSink) -> Vec<(String, String)> {
    sink.decisions()
        .into_iter()
        .filter_map(|d| match d {
            Decision::Bind {
                pod_uid, node_name, ..
            } => Some((pod_uid, node_name)),
            _ => None,
        })
        .collect()
}

fn unschedulable_decisions(sink: &RecordingSink) -> Vec<(String, String, bool)> {
    sink.decisions()
        .into_iter()
        .filter_map(|d| match d {
            Decision::Unschedulable {
                pod_uid,
                reason,
                retryable,
                ..
            } => Some((pod_uid, reason, retryable)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn single_pod_lands_on_the_emptiest_node() {
    let (scheduler, sink) = default_scheduler();
    scheduler.on_node_add(node("node-busy", 10_000, 1 << 30)).await;
    scheduler.on_node_add(node("node-idle", 10_000, 1 << 30)).await;
    scheduler
        .snapshot()
        .write()
        .await
        .assume_pod("node-busy", Arc::new(pod("resident", "resident", 8_000, 1 << 20)))
        .unwrap();

    scheduler.on_pod_add(pod("web", "uid-web", 1_000, 1 << 20)).await;
    let unit = pop_unit(&scheduler).await;
    scheduler.process_unit(unit).await;

    assert_eq!(
        bind_decisions(&sink),
        vec![("uid-web".to_string(), "node-idle".to_string())]
    );
    let snapshot = scheduler.snapshot().read().await;
    assert_eq!(snapshot.assumed_node("uid-web"), Some("node-idle"));
    assert_eq!(
        snapshot.get("node-idle").unwrap().requested().milli_cpu,
        1_000
    );
}

#[tokio::test]
async fn unschedulable_cycle_mutates_nothing_and_requeues() {
    let (scheduler, sink) = default_scheduler();
    scheduler.on_node_add(node("node-a", 1_000, 1 << 20)).await;

    scheduler.on_pod_add(pod("giant", "uid-giant", 64_000, 1 << 30)).await;
    let unit = pop_unit(&scheduler).await;
    scheduler.process_unit(unit).await;

    let unschedulable = unschedulable_decisions(&sink);
    assert_eq!(unschedulable.len(), 1);
    let (uid, reason, retryable) = &unschedulable[0];
    assert_eq!(uid, "uid-giant");
    assert!(reason.contains("could not satisfy"), "reason: {reason}");
    assert!(retryable);
    assert!(bind_decisions(&sink).is_empty());

    // Invariant: a failed cycle is invisible to later cycles.
    let snapshot = scheduler.snapshot().read().await;
    assert_eq!(snapshot.get("node-a").unwrap().requested().milli_cpu, 0);
    assert_eq!(snapshot.get("node-a").unwrap().num_pods(), 0);
    drop(snapshot);

    // The unit is backing off, then becomes poppable again.
    assert!(scheduler.queue().try_pop().await.is_none());
    let later = Utc::now() + chrono::Duration::seconds(2);
    scheduler.queue().flush_backoff(later).await;
    assert!(scheduler.queue().try_pop().await.is_some());
}

#[tokio::test]
async fn no_nodes_is_unschedulable() {
    let (scheduler, _sink) = default_scheduler();
    let unit = SchedulingUnit::new_single(QueuedPodInfo::new(
        Arc::new(pod("web", "uid-web", 100, 1)),
        Utc::now(),
    ));
    match scheduler.schedule_unit(&unit, &CycleContext::new()).await {
        UnitOutcome::Unschedulable(status) => {
            assert_eq!(status.message(), ERR_REASON_NO_NODES)
        }
        _ => panic!("expected unschedulable"),
    }
}

#[tokio::test]
async fn gang_below_quorum_rolls_back_everything() {
    let (scheduler, sink) = default_scheduler();
    // Fits two 4-core members, not three.
    scheduler.on_node_add(node("node-a", 10_000, 1 << 30)).await;

    scheduler.on_group_add(PodGroup::new("ml", "ring", 3)).await;
    for uid in ["m1", "m2", "m3"] {
        scheduler.on_pod_add(gang_pod("ring", uid, 4_000)).await;
    }

    let unit = pop_unit(&scheduler).await;
    assert_eq!(unit.num_pods(), 3);
    scheduler.process_unit(unit).await;

    assert!(bind_decisions(&sink).is_empty());
    assert_eq!(unschedulable_decisions(&sink).len(), 3);

    let snapshot = scheduler.snapshot().read().await;
    assert_eq!(snapshot.get("node-a").unwrap().requested().milli_cpu, 0);
    assert_eq!(snapshot.get("node-a").unwrap().num_pods(), 0);
}

#[tokio::test]
async fn gang_at_quorum_places_and_requeues_the_rest() {
    let (scheduler, sink) = default_scheduler();
    scheduler.on_node_add(node("node-a", 10_000, 1 << 30)).await;

    let mut group = PodGroup::new("ml", "ring", 2);
    group.schedule_timeout_seconds = Some(600);
    scheduler.on_group_add(group).await;
    for uid in ["m1", "m2", "m3"] {
        scheduler.on_pod_add(gang_pod("ring", uid, 4_000)).await;
    }

    let unit = pop_unit(&scheduler).await;
    scheduler.process_unit(unit).await;

    let binds = bind_decisions(&sink);
    assert_eq!(binds.len(), 2);
    let unschedulable = unschedulable_decisions(&sink);
    assert_eq!(unschedulable.len(), 1);
    assert!(unschedulable[0].2, "leftover member should be retryable");

    let snapshot = scheduler.snapshot().read().await;
    assert_eq!(snapshot.get("node-a").unwrap().requested().milli_cpu, 8_000);
    assert_eq!(snapshot.get("node-a").unwrap().num_pods(), 2);
}

#[tokio::test]
async fn gang_spreads_over_reserved_capacity() {
    let (scheduler, sink) = default_scheduler();
    // Each node fits exactly one 6-core member.
    scheduler.on_node_add(node("node-a", 10_000, 1 << 30)).await;
    scheduler.on_node_add(node("node-b", 10_000, 1 << 30)).await;

    scheduler.on_group_add(PodGroup::new("ml", "pair", 2)).await;
    scheduler.on_pod_add(gang_pod("pair", "m1", 6_000)).await;
    scheduler.on_pod_add(gang_pod("pair", "m2", 6_000)).await;

    let unit = pop_unit(&scheduler).await;
    scheduler.process_unit(unit).await;

    let mut nodes: Vec<String> = bind_decisions(&sink).into_iter().map(|(_, n)| n).collect();
    nodes.sort();
    assert_eq!(nodes, vec!["node-a", "node-b"]);

    // The attempt's reservations rode along on each bind decision.
    let reservations = sink
        .decisions()
        .into_iter()
        .find_map(|d| match d {
            Decision::Bind { reservations, .. } => Some(reservations),
            _ => None,
        })
        .unwrap();
    assert!(reservations.on_node("node-a").is_some());
    assert!(reservations.on_node("node-b").is_some());
}

#[tokio::test]
async fn cancelled_cycle_returns_the_unit() {
    let (scheduler, _sink) = default_scheduler();
    scheduler.on_node_add(node("node-a", 10_000, 1 << 30)).await;

    let unit = SchedulingUnit::new_single(QueuedPodInfo::new(
        Arc::new(pod("web", "uid-web", 100, 1)),
        Utc::now(),
    ));
    let ctx = CycleContext::new();
    ctx.cancel();
    assert!(matches!(
        scheduler.schedule_unit(&unit, &ctx).await,
        UnitOutcome::Cancelled
    ));
}

#[tokio::test]
async fn gang_timeout_reports_members_as_final() {
    let (scheduler, sink) = default_scheduler();
    let mut group = PodGroup::new("ml", "ring", 3);
    group.schedule_timeout_seconds = Some(60);
    scheduler.on_group_add(group).await;
    scheduler.on_pod_add(gang_pod("ring", "m1", 1_000)).await;

    scheduler
        .sweep_timed_out(Utc::now() + chrono::Duration::seconds(120))
        .await;

    let unschedulable = unschedulable_decisions(&sink);
    assert_eq!(unschedulable.len(), 1);
    let (uid, reason, retryable) = &unschedulable[0];
    assert_eq!(uid, "m1");
    assert!(reason.contains("timed out waiting for quorum"));
    assert!(!retryable);
}

struct GatedPermit {
    bound: Duration,
}

impl Plugin for GatedPermit {
    fn name(&self) -> &'static str {
        "GatedPermit"
    }
}

impl PermitPlugin for GatedPermit {
    fn permit(
        &self,
        _ctx: &CycleContext,
        _state: &CycleState,
        _pod: &PodInfo,
        _node_name: &str,
    ) -> (Status, Duration) {
        (Status::wait("holding for approval"), self.bound)
    }
}

fn gated_scheduler(bound: Duration) -> (Arc<Scheduler>, Arc<RecordingSink>) {
    let fit = Arc::new(Fit::new(&Default::default()).unwrap());
    let registry = PluginRegistry::builder()
        .with_pre_filter(Arc::clone(&fit) as Arc<dyn PreFilterPlugin>)
        .with_filter(fit)
        .with_permit(Arc::new(GatedPermit { bound }))
        .build();
    let sink = Arc::new(RecordingSink::new());
    (Arc::new(Scheduler::new(registry, sink.clone())), sink)
}

#[tokio::test]
async fn permit_wait_resolves_on_approval() {
    let (scheduler, sink) = gated_scheduler(Duration::from_secs(5));
    scheduler.on_node_add(node("node-a", 10_000, 1 << 30)).await;
    scheduler.on_pod_add(pod("web", "uid-web", 100, 1)).await;

    let unit = pop_unit(&scheduler).await;
    let worker = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.process_unit(unit).await })
    };

    // Approve once the pod parks at the permit gate.
    let mut approved = false;
    for _ in 0..200 {
        if scheduler.approve_waiting_pod("uid-web", true).await {
            approved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(approved, "pod never reached the permit gate");

    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("cycle should finish after approval")
        .unwrap();
    assert_eq!(bind_decisions(&sink).len(), 1);
}

#[tokio::test]
async fn permit_wait_times_out_as_unschedulable() {
    let (scheduler, sink) = gated_scheduler(Duration::from_millis(50));
    scheduler.on_node_add(node("node-a", 10_000, 1 << 30)).await;
    scheduler.on_pod_add(pod("web", "uid-web", 100, 1)).await;

    let unit = pop_unit(&scheduler).await;
    scheduler.process_unit(unit).await;

    let unschedulable = unschedulable_decisions(&sink);
    assert_eq!(unschedulable.len(), 1);
    assert!(unschedulable[0].1.contains("timed out waiting on permit"));
    assert!(bind_decisions(&sink).is_empty());
}

#[tokio::test]
async fn worker_loop_schedules_from_events() {
    let (scheduler, sink) = default_scheduler();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(Arc::clone(&scheduler).run(2, shutdown_rx));

    scheduler.on_node_add(node("node-a", 10_000, 1 << 30)).await;
    scheduler.on_pod_add(pod("web", "uid-web", 1_000, 1 << 20)).await;

    let mut bound = Vec::new();
    for _ in 0..400 {
        bound = bind_decisions(&sink);
        if !bound.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(bound, vec![("uid-web".to_string(), "node-a".to_string())]);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("workers should stop on shutdown")
        .unwrap();
}

#[tokio::test]
async fn stale_node_update_does_not_regress_capacity() {
    let (scheduler, _sink) = default_scheduler();
    let mut fresh = node("node-a", 20_000, 1 << 30);
    fresh.resource_version = 7;
    scheduler.on_node_add(fresh).await;

    let mut stale = node("node-a", 1_000, 1 << 10);
    stale.resource_version = 3;
    scheduler.on_node_update(stale).await;

    let snapshot = scheduler.snapshot().read().await;
    assert_eq!(snapshot.get("node-a").unwrap().allocatable.milli_cpu, 20_000);
}
