//! The placement cycle and the worker loop.
//!
//! A worker pops one ready unit at a time and drives every member
//! through the pipeline against a shared read-only node view. Members
//! charge tentative occupancy into a per-cycle reservation overlay;
//! nothing touches the authoritative snapshot until the whole unit
//! commits. Gangs are all-or-nothing below their `min_member` quorum.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use gangway_framework::cycle_state::CycleState;
use gangway_framework::group::PodGroup;
use gangway_framework::node::NodeSnapshot;
use gangway_framework::pod::{PodInfo, QueuedPodInfo, Uid};
use gangway_framework::reservation::ReservationPlaceholdersOfNodes;
use gangway_framework::status::{Code, Status};
use gangway_framework::unit::SchedulingUnit;
use gangway_framework::CycleContext;
use gangway_queue::SharedUnitQueue;

use crate::decision::{Decision, DecisionSink};
use crate::pipeline::{
    cancelled_status, collect_filter_failure, run_filter_plugins, run_permit_plugins,
    run_post_filter_plugins, run_pre_filter_plugins, run_pre_score_plugins, run_score_plugins,
    select_node,
};
use crate::registry::PluginRegistry;
use crate::snapshot::ClusterSnapshot;

/// Diagnostic for cycles entered with an empty cluster view.
pub const ERR_REASON_NO_NODES: &str = "no nodes registered in cluster";

/// How often retry backoffs are released and pending gangs are checked
/// against their deadline.
const MAINTENANCE_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// One member successfully pushed through Reserve and Permit.
pub struct Placement {
    pub pod: Arc<PodInfo>,
    pub node_name: String,
    state: CycleState,
}

/// What a unit-level placement attempt produced.
pub struct UnitResult {
    pub placements: Vec<Placement>,
    /// Members that failed this attempt while the unit still met its
    /// quorum; they re-enter the queue individually.
    pub unplaced: Vec<(QueuedPodInfo, Status)>,
    pub reservations: ReservationPlaceholdersOfNodes,
}

/// Terminal outcome of one placement attempt.
pub enum UnitOutcome {
    Placed(UnitResult),
    Unschedulable(Status),
    /// The cycle was aborted at a stage boundary; the unit goes back
    /// to the queue with its attempt count incremented.
    Cancelled,
}

/// The scheduler: queue, cluster view, pipeline, decision sink.
pub struct Scheduler {
    registry: Arc<PluginRegistry>,
    snapshot: Arc<RwLock<ClusterSnapshot>>,
    queue: Arc<SharedUnitQueue>,
    sink: Arc<dyn DecisionSink>,
    permit_waiters: Mutex<HashMap<Uid, oneshot::Sender<bool>>>,
}

impl Scheduler {
    pub fn new(registry: PluginRegistry, sink: Arc<dyn DecisionSink>) -> Self {
        Self {
            registry: Arc::new(registry),
            snapshot: Arc::new(RwLock::new(ClusterSnapshot::new())),
            queue: Arc::new(SharedUnitQueue::new()),
            sink,
            permit_waiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn queue(&self) -> &Arc<SharedUnitQueue> {
        &self.queue
    }

    pub fn snapshot(&self) -> &Arc<RwLock<ClusterSnapshot>> {
        &self.snapshot
    }

    // ── Inbound events ──────────────────────────────────────────────

    pub async fn on_pod_add(&self, pod: PodInfo) {
        let now = Utc::now();
        debug!(pod = %pod.full_name(), "pod added");
        self.queue
            .add_pod(QueuedPodInfo::new(Arc::new(pod), now), now)
            .await;
    }

    /// Out-of-order updates (older resource version for the same UID)
    /// are dropped.
    pub async fn on_pod_update(&self, old: &PodInfo, new: PodInfo) {
        if new.uid == old.uid && new.resource_version < old.resource_version {
            debug!(pod = %new.full_name(), "dropping out-of-order pod update");
            return;
        }
        let now = Utc::now();
        self.queue
            .update_pod(QueuedPodInfo::new(Arc::new(new), now), now)
            .await;
    }

    pub async fn on_pod_delete(&self, pod: &PodInfo) {
        let now = Utc::now();
        self.queue.delete_pod(&pod.uid, now).await;
        self.snapshot.write().await.forget_pod(&pod.uid);
    }

    pub async fn on_group_add(&self, group: PodGroup) {
        self.queue.add_group(Arc::new(group), Utc::now()).await;
    }

    pub async fn on_group_update(&self, old: &PodGroup, new: PodGroup) {
        if new.resource_version < old.resource_version {
            debug!(group = %new.full_name(), "dropping out-of-order group update");
            return;
        }
        self.queue.update_group(Arc::new(new), Utc::now()).await;
    }

    pub async fn on_group_delete(&self, group: &PodGroup) {
        let released = self.queue.delete_group(&group.namespace, &group.name).await;
        for pod in released {
            self.submit(Decision::Unschedulable {
                pod_uid: pod.uid().to_string(),
                reason: format!("pod group {} deleted", group.full_name()),
                failed_plugins: Vec::new(),
                retryable: false,
            });
        }
    }

    pub async fn on_node_add(&self, node: NodeSnapshot) {
        self.snapshot.write().await.upsert_node(node);
    }

    pub async fn on_node_update(&self, node: NodeSnapshot) {
        self.snapshot.write().await.upsert_node(node);
    }

    pub async fn on_node_delete(&self, name: &str) {
        self.snapshot.write().await.remove_node(name);
    }

    // ── Placement ──────────────────────────────────────────────────

    /// Drive one unit through the pipeline. Pure with respect to the
    /// authoritative snapshot: all accounting happens in a per-cycle
    /// reservation overlay.
    pub async fn schedule_unit(&self, unit: &SchedulingUnit, ctx: &CycleContext) -> UnitOutcome {
        let mut members: Vec<QueuedPodInfo> = unit.get_pods().into_iter().cloned().collect();
        members.sort_by(|a, b| a.uid().cmp(b.uid()));

        let base_nodes = self.snapshot.read().await.nodes();
        if base_nodes.is_empty() {
            return UnitOutcome::Unschedulable(Status::unschedulable(ERR_REASON_NO_NODES));
        }
        let min_member = unit.get_min_member() as usize;
        if unit.is_debug_mode_on() {
            info!(unit = %unit, nodes = base_nodes.len(), "debug: starting placement attempt");
        }

        let mut working: HashMap<String, Arc<NodeSnapshot>> = HashMap::new();
        let mut reservations = ReservationPlaceholdersOfNodes::default();
        let mut placements: Vec<Placement> = Vec::new();
        let mut unplaced: Vec<(QueuedPodInfo, Status)> = Vec::new();

        for member in members {
            if ctx.is_cancelled() {
                self.rollback(ctx, placements);
                return UnitOutcome::Cancelled;
            }
            let pod = Arc::clone(&member.pod);
            match self.schedule_pod(ctx, &pod, &base_nodes, &working).await {
                Ok((node_name, state)) => {
                    let base = working
                        .get(&node_name)
                        .cloned()
                        .or_else(|| {
                            base_nodes.iter().find(|n| n.name == node_name).cloned()
                        })
                        .expect("selected node comes from the candidate set");
                    let mut adjusted = base.as_ref().clone();
                    adjusted.add_pod(Arc::clone(&pod));
                    working.insert(node_name.clone(), Arc::new(adjusted));

                    reservations.reserve(node_name.clone(), Arc::clone(&pod));
                    if unit.is_debug_mode_on() {
                        info!(pod = %pod.full_name(), node = %node_name, "debug: member reserved");
                    }
                    placements.push(Placement {
                        pod,
                        node_name,
                        state,
                    });
                }
                Err(status) => {
                    if ctx.is_cancelled() {
                        self.rollback(ctx, placements);
                        return UnitOutcome::Cancelled;
                    }
                    if unit.is_debug_mode_on() {
                        info!(pod = %pod.full_name(), status = %status, "debug: member not placeable");
                    }
                    unplaced.push((member, status));
                }
            }
        }

        if placements.len() >= min_member {
            UnitOutcome::Placed(UnitResult {
                placements,
                unplaced,
                reservations,
            })
        } else {
            let mut terminal = Status::success();
            for (_, status) in &unplaced {
                terminal.merge(status.clone());
            }
            if terminal.is_success() {
                terminal = Status::unschedulable(format!(
                    "unit holds {} members, quorum is {min_member}",
                    placements.len()
                ));
            }
            self.rollback(ctx, placements);
            UnitOutcome::Unschedulable(terminal)
        }
    }

    /// Pipeline for one member: PreFilter → Filter fan-out →
    /// (PostFilter) → PreScore → Score fan-out → Reserve → Permit.
    async fn schedule_pod(
        &self,
        ctx: &CycleContext,
        pod: &Arc<PodInfo>,
        base_nodes: &[Arc<NodeSnapshot>],
        working: &HashMap<String, Arc<NodeSnapshot>>,
    ) -> Result<(String, CycleState), Status> {
        // Overlay this cycle's reservations on the shared node view.
        let candidates: Vec<Arc<NodeSnapshot>> = base_nodes
            .iter()
            .map(|node| {
                working
                    .get(&node.name)
                    .cloned()
                    .unwrap_or_else(|| Arc::clone(node))
            })
            .collect();

        let mut state = CycleState::new();
        let status = run_pre_filter_plugins(&self.registry, ctx, &mut state, pod);
        if !status.is_success() {
            return Err(status);
        }
        if ctx.is_cancelled() {
            return Err(cancelled_status());
        }

        let shared = Arc::new(state);
        let filter_results =
            run_filter_plugins(&self.registry, ctx, &shared, pod, &candidates).await;
        let mut state = match Arc::try_unwrap(shared) {
            Ok(state) => state,
            Err(arc) => arc.clone_state(),
        };
        if ctx.is_cancelled() {
            return Err(cancelled_status());
        }

        let feasible: Vec<Arc<NodeSnapshot>> = candidates
            .iter()
            .zip(&filter_results)
            .filter(|(_, result)| result.status.is_success())
            .map(|(node, _)| Arc::clone(node))
            .collect();

        if feasible.is_empty() {
            let statuses: HashMap<String, Status> = filter_results
                .iter()
                .map(|r| (r.node_name.clone(), r.status.clone()))
                .collect();
            let post =
                run_post_filter_plugins(&self.registry, ctx, &mut state, pod, &candidates, &statuses);
            if post.code() == Code::Error {
                return Err(post);
            }
            return Err(collect_filter_failure(&filter_results));
        }

        let status = run_pre_score_plugins(&self.registry, ctx, &mut state, pod, &feasible);
        if !status.is_success() {
            return Err(status);
        }
        if ctx.is_cancelled() {
            return Err(cancelled_status());
        }

        let shared = Arc::new(state);
        let scores = run_score_plugins(&self.registry, ctx, &shared, pod, &feasible).await?;
        let mut state = match Arc::try_unwrap(shared) {
            Ok(state) => state,
            Err(arc) => arc.clone_state(),
        };

        let selected = select_node(&scores)
            .expect("feasible set is non-empty")
            .node_name
            .clone();
        debug!(
            pod = %pod.full_name(),
            node = %selected,
            feasible = feasible.len(),
            "node selected"
        );

        // Reserve: executed plugins are unwound in reverse on failure.
        for (executed, plugin) in self.registry.reserve.iter().enumerate() {
            let status = plugin.reserve(ctx, &mut state, pod, &selected);
            if !status.is_success() && !status.is_skip() {
                for unwound in self.registry.reserve[..executed].iter().rev() {
                    unwound.unreserve(ctx, &mut state, pod, &selected);
                }
                return Err(status.with_failed_plugin(plugin.name()));
            }
        }
        if ctx.is_cancelled() {
            self.unreserve_all(ctx, &mut state, pod, &selected);
            return Err(cancelled_status());
        }

        let (permit_status, wait_bound) =
            run_permit_plugins(&self.registry, ctx, &state, pod, &selected);
        let permit_outcome = if permit_status.is_wait() {
            let bound = wait_bound.unwrap_or_default();
            self.wait_on_permit(&pod.uid, bound).await
        } else {
            permit_status
        };
        if !permit_outcome.is_success() {
            self.unreserve_all(ctx, &mut state, pod, &selected);
            return Err(permit_outcome);
        }

        Ok((selected, state))
    }

    fn unreserve_all(
        &self,
        ctx: &CycleContext,
        state: &mut CycleState,
        pod: &Arc<PodInfo>,
        node_name: &str,
    ) {
        for plugin in self.registry.reserve.iter().rev() {
            plugin.unreserve(ctx, state, pod, node_name);
        }
    }

    /// Undo every completed member reservation, newest first.
    fn rollback(&self, ctx: &CycleContext, placements: Vec<Placement>) {
        for mut placement in placements.into_iter().rev() {
            self.unreserve_all(ctx, &mut placement.state, &placement.pod, &placement.node_name);
        }
    }

    // ── Permit waiting ─────────────────────────────────────────────

    async fn wait_on_permit(&self, uid: &str, bound: StdDuration) -> Status {
        let (tx, rx) = oneshot::channel();
        self.permit_waiters.lock().await.insert(uid.to_string(), tx);
        let outcome = tokio::time::timeout(bound, rx).await;
        self.permit_waiters.lock().await.remove(uid);
        match outcome {
            Ok(Ok(true)) => Status::success(),
            Ok(Ok(false)) => Status::unschedulable("pod rejected while waiting on permit"),
            Ok(Err(_)) => Status::unschedulable("permit approval channel closed"),
            Err(_) => Status::unschedulable("timed out waiting on permit"),
        }
    }

    /// Release a pod held at the Permit stage. Returns false when no
    /// such pod is waiting.
    pub async fn approve_waiting_pod(&self, uid: &str, allow: bool) -> bool {
        match self.permit_waiters.lock().await.remove(uid) {
            Some(tx) => tx.send(allow).is_ok(),
            None => false,
        }
    }

    // ── Commit & loop ──────────────────────────────────────────────

    /// Schedule one popped unit end to end and act on the outcome.
    pub async fn process_unit(&self, unit: SchedulingUnit) {
        let ctx = CycleContext::new();
        match self.schedule_unit(&unit, &ctx).await {
            UnitOutcome::Placed(result) => self.commit_unit(&ctx, unit, result).await,
            UnitOutcome::Unschedulable(status) => {
                let retryable = status.code() != Code::UnschedulableAndUnresolvable;
                for pod in unit.get_pods() {
                    self.submit(Decision::Unschedulable {
                        pod_uid: pod.uid().to_string(),
                        reason: status.message(),
                        failed_plugins: status.failed_plugins().to_vec(),
                        retryable,
                    });
                }
                info!(unit = %unit.unit_key(), status = %status, "unit unschedulable");
                if retryable {
                    self.queue
                        .requeue(unit, Some(status.message()), Utc::now())
                        .await;
                }
            }
            UnitOutcome::Cancelled => {
                debug!(unit = %unit.unit_key(), "cycle cancelled, requeueing");
                self.queue.requeue(unit, None, Utc::now()).await;
            }
        }
    }

    fn run_bind_stages(&self, ctx: &CycleContext, placements: &[Placement]) -> Option<Status> {
        for placement in placements {
            for plugin in &self.registry.pre_bind {
                let status =
                    plugin.pre_bind(ctx, &placement.state, &placement.pod, &placement.node_name);
                if !status.is_success() && !status.is_skip() {
                    return Some(status.with_failed_plugin(plugin.name()));
                }
            }
            for plugin in &self.registry.bind {
                let status =
                    plugin.bind(ctx, &placement.state, &placement.pod, &placement.node_name);
                if !status.is_success() && !status.is_skip() {
                    return Some(status.with_failed_plugin(plugin.name()));
                }
            }
        }
        None
    }

    async fn commit_unit(&self, ctx: &CycleContext, unit: SchedulingUnit, result: UnitResult) {
        let UnitResult {
            placements,
            unplaced,
            reservations,
        } = result;

        if let Some(status) = self.run_bind_stages(ctx, &placements) {
            warn!(unit = %unit.unit_key(), status = %status, "bind stage failed, requeueing unit");
            self.rollback(ctx, placements);
            self.queue
                .requeue(unit, Some(status.message()), Utc::now())
                .await;
            return;
        }

        // Fold into the authoritative snapshot; this is the only point
        // where a cycle becomes visible to later cycles.
        {
            let mut snapshot = self.snapshot.write().await;
            let mut assumed = 0usize;
            let mut failure = None;
            for placement in &placements {
                match snapshot.assume_pod(&placement.node_name, Arc::clone(&placement.pod)) {
                    Ok(()) => assumed += 1,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            if let Some(err) = failure {
                for placement in &placements[..assumed] {
                    snapshot.forget_pod(&placement.pod.uid);
                }
                drop(snapshot);
                warn!(unit = %unit.unit_key(), error = %err, "node vanished mid-cycle, requeueing unit");
                self.rollback(ctx, placements);
                self.queue
                    .requeue(unit, Some(err.to_string()), Utc::now())
                    .await;
                return;
            }
        }

        for placement in &placements {
            for plugin in &self.registry.post_bind {
                plugin.post_bind(ctx, &placement.state, &placement.pod, &placement.node_name);
            }
            self.submit(Decision::Bind {
                pod_uid: placement.pod.uid.clone(),
                node_name: placement.node_name.clone(),
                reservations: reservations.clone(),
            });
        }

        let now = Utc::now();
        for (mut member, status) in unplaced {
            member.attempts += 1;
            member.unschedulable_reason = Some(status.message());
            self.submit(Decision::Unschedulable {
                pod_uid: member.uid().to_string(),
                reason: status.message(),
                failed_plugins: status.failed_plugins().to_vec(),
                retryable: true,
            });
            self.queue.add_pod(member, now).await;
        }
        info!(unit = %unit.unit_key(), placed = placements.len(), "unit placed");
    }

    /// Expel gangs that missed their deadline and report their members.
    pub async fn sweep_timed_out(&self, now: DateTime<Utc>) {
        for timed_out in self.queue.flush_timed_out(now).await {
            let key = timed_out.unit.unit_key().to_string();
            for pod in timed_out.unit.get_pods() {
                self.submit(Decision::Unschedulable {
                    pod_uid: pod.uid().to_string(),
                    reason: format!("gang {key} timed out waiting for quorum"),
                    failed_plugins: Vec::new(),
                    retryable: false,
                });
            }
        }
    }

    /// A sink failure is an internal error: logged, the decision is
    /// dropped, the scheduler keeps running.
    fn submit(&self, decision: Decision) {
        if let Err(err) = self.sink.submit(decision) {
            error!(error = %err, "decision sink failed");
        }
    }

    /// Run `workers` placement workers plus the gang-timeout sweeper
    /// until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, workers: usize, shutdown: watch::Receiver<bool>) {
        let mut handles = Vec::with_capacity(workers + 1);
        for worker in 0..workers {
            let this = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                        unit = this.queue.pop_wait() => {
                            this.process_unit(unit).await;
                        }
                    }
                }
                debug!(worker, "scheduler worker stopped");
            }));
        }

        {
            let this = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
                loop {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                        _ = ticker.tick() => {
                            let now = Utc::now();
                            this.queue.flush_backoff(now).await;
                            this.sweep_timed_out(now).await;
                        }
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}
