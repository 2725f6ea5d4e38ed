//! Stage dispatch: sequential extension points plus node-parallel
//! fan-out for Filter and Score.
//!
//! Fan-out spawns one task per candidate node over `Arc`-shared
//! read-only inputs; each task writes only its own indexed slot of the
//! result vector. A stage failure short-circuits the remaining stages
//! for that node but never across nodes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use gangway_framework::cycle_state::CycleState;
use gangway_framework::node::NodeSnapshot;
use gangway_framework::pod::PodInfo;
use gangway_framework::status::{Code, Status};
use gangway_framework::CycleContext;

use crate::registry::PluginRegistry;

/// Message used when a cycle is aborted at a stage boundary.
pub const CANCELLED_MSG: &str = "scheduling cycle cancelled";

/// Filter outcome for one candidate node.
#[derive(Debug, Clone)]
pub struct NodeFilterResult {
    pub node_name: String,
    pub status: Status,
}

/// Weighted score total for one feasible node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeScore {
    pub node_name: String,
    pub score: i64,
}

pub(crate) fn cancelled_status() -> Status {
    Status::error(CANCELLED_MSG)
}

/// Run PreFilter plugins in order. `Skip` moves on; any other
/// non-success short-circuits.
pub fn run_pre_filter_plugins(
    registry: &PluginRegistry,
    ctx: &CycleContext,
    state: &mut CycleState,
    pod: &PodInfo,
) -> Status {
    for plugin in &registry.pre_filter {
        if ctx.is_cancelled() {
            return cancelled_status();
        }
        let status = plugin.pre_filter(ctx, state, pod);
        if status.is_skip() {
            continue;
        }
        if !status.is_success() {
            return status.with_failed_plugin(plugin.name());
        }
    }
    Status::success()
}

fn filter_one(
    registry: &PluginRegistry,
    ctx: &CycleContext,
    state: &CycleState,
    pod: &PodInfo,
    node: &NodeSnapshot,
) -> Status {
    for plugin in &registry.filter {
        let status = plugin.filter(ctx, state, pod, node);
        if status.is_skip() {
            continue;
        }
        if !status.is_success() {
            return status;
        }
    }
    Status::success()
}

/// Fan Filter out across candidate nodes.
pub async fn run_filter_plugins(
    registry: &Arc<PluginRegistry>,
    ctx: &CycleContext,
    state: &Arc<CycleState>,
    pod: &Arc<PodInfo>,
    nodes: &[Arc<NodeSnapshot>],
) -> Vec<NodeFilterResult> {
    let mut results: Vec<NodeFilterResult> = nodes
        .iter()
        .map(|node| NodeFilterResult {
            node_name: node.name.clone(),
            status: Status::success(),
        })
        .collect();

    let mut handles = Vec::with_capacity(nodes.len());
    for node in nodes {
        let registry = Arc::clone(registry);
        let ctx = ctx.clone();
        let state = Arc::clone(state);
        let pod = Arc::clone(pod);
        let node = Arc::clone(node);
        handles.push(tokio::spawn(async move {
            filter_one(&registry, &ctx, &state, &pod, &node)
        }));
    }
    for (idx, handle) in handles.into_iter().enumerate() {
        results[idx].status = match handle.await {
            Ok(status) => status,
            Err(err) => Status::error(format!("filter task failed: {err}")),
        };
    }
    results
}

/// Aggregate per-node Filter failures into one terminal status.
///
/// The terminal code is the most severe observed (`Error >
/// UnschedulableAndUnresolvable > Unschedulable`); identical reasons
/// collapse into a count prefix, e.g. `3 node(s) had too many pods`.
pub fn collect_filter_failure(results: &[NodeFilterResult]) -> Status {
    const SEVERITY: [Code; 3] = [
        Code::Unschedulable,
        Code::UnschedulableAndUnresolvable,
        Code::Error,
    ];
    let rank = |c: Code| SEVERITY.iter().position(|&x| x == c).unwrap_or(0);

    let mut code = Code::Unschedulable;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut failed_plugins: BTreeSet<String> = BTreeSet::new();

    for result in results {
        let status = &result.status;
        if status.is_success() {
            continue;
        }
        if rank(status.code()) > rank(code) {
            code = status.code();
        }
        for reason in status.reasons() {
            *counts.entry(reason.clone()).or_default() += 1;
        }
        for plugin in status.failed_plugins() {
            failed_plugins.insert(plugin.clone());
        }
    }

    let mut aggregate = Status::new(
        code,
        counts
            .iter()
            .map(|(reason, count)| format!("{count} {reason}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    for plugin in failed_plugins {
        aggregate = aggregate.with_failed_plugin(plugin);
    }
    aggregate
}

/// Run PostFilter plugins (victim selection) after every node failed
/// Filter. Statuses are collected; any `Error` surfaces.
pub fn run_post_filter_plugins(
    registry: &PluginRegistry,
    ctx: &CycleContext,
    state: &mut CycleState,
    pod: &PodInfo,
    nodes: &[Arc<NodeSnapshot>],
    filter_statuses: &HashMap<String, Status>,
) -> Status {
    let mut aggregate = Status::success();
    for plugin in &registry.post_filter {
        if ctx.is_cancelled() {
            return cancelled_status();
        }
        let status = plugin.post_filter(ctx, state, pod, nodes, filter_statuses);
        if status.code() == Code::Error {
            return status.with_failed_plugin(plugin.name());
        }
        aggregate.merge(status);
    }
    aggregate
}

pub fn run_pre_score_plugins(
    registry: &PluginRegistry,
    ctx: &CycleContext,
    state: &mut CycleState,
    pod: &PodInfo,
    nodes: &[Arc<NodeSnapshot>],
) -> Status {
    for plugin in &registry.pre_score {
        if ctx.is_cancelled() {
            return cancelled_status();
        }
        let status = plugin.pre_score(ctx, state, pod, nodes);
        if status.is_skip() {
            continue;
        }
        if !status.is_success() {
            return status.with_failed_plugin(plugin.name());
        }
    }
    Status::success()
}

fn score_one(
    registry: &PluginRegistry,
    ctx: &CycleContext,
    state: &CycleState,
    pod: &PodInfo,
    node: &NodeSnapshot,
) -> Result<i64, Status> {
    let mut total = 0i64;
    for entry in &registry.score {
        let (score, status) = entry.plugin.score(ctx, state, pod, node);
        if !status.is_success() {
            return Err(status.with_failed_plugin(entry.plugin.name()));
        }
        total += score * entry.weight;
    }
    Ok(total)
}

/// Fan Score out across feasible nodes; any per-node failure surfaces
/// as the whole stage's error.
pub async fn run_score_plugins(
    registry: &Arc<PluginRegistry>,
    ctx: &CycleContext,
    state: &Arc<CycleState>,
    pod: &Arc<PodInfo>,
    nodes: &[Arc<NodeSnapshot>],
) -> Result<Vec<NodeScore>, Status> {
    let mut handles = Vec::with_capacity(nodes.len());
    for node in nodes {
        let registry = Arc::clone(registry);
        let ctx = ctx.clone();
        let state = Arc::clone(state);
        let pod = Arc::clone(pod);
        let node = Arc::clone(node);
        handles.push(tokio::spawn(async move {
            score_one(&registry, &ctx, &state, &pod, &node)
        }));
    }

    let mut scores = Vec::with_capacity(nodes.len());
    for (idx, handle) in handles.into_iter().enumerate() {
        let score = match handle.await {
            Ok(result) => result?,
            Err(err) => return Err(Status::error(format!("score task failed: {err}"))),
        };
        scores.push(NodeScore {
            node_name: nodes[idx].name.clone(),
            score,
        });
    }
    Ok(scores)
}

/// Pick the winning node: highest score, node name as the
/// deterministic tie-break.
pub fn select_node(scores: &[NodeScore]) -> Option<&NodeScore> {
    scores.iter().min_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.node_name.cmp(&b.node_name))
    })
}

/// Run Permit plugins. Returns the aggregate status and, when any
/// plugin asked to wait, the tightest wait bound.
pub fn run_permit_plugins(
    registry: &PluginRegistry,
    ctx: &CycleContext,
    state: &CycleState,
    pod: &PodInfo,
    node_name: &str,
) -> (Status, Option<Duration>) {
    let mut wait_bound: Option<Duration> = None;
    for plugin in &registry.permit {
        if ctx.is_cancelled() {
            return (cancelled_status(), None);
        }
        let (status, timeout) = plugin.permit(ctx, state, pod, node_name);
        match status.code() {
            Code::Success | Code::Skip => {}
            Code::Wait => {
                wait_bound = Some(match wait_bound {
                    Some(bound) => bound.min(timeout),
                    None => timeout,
                });
            }
            _ => return (status.with_failed_plugin(plugin.name()), None),
        }
    }
    if let Some(bound) = wait_bound {
        (Status::wait("waiting on permit"), Some(bound))
    } else {
        (Status::success(), None)
    }
}
