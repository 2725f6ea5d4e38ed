//! Extension-point traits the placement pipeline dispatches to.
//!
//! Extension points run in this order:
//! PreFilter → Filter (per node) → PostFilter → PreScore →
//! Score (per node) → Reserve → Permit → PreBind → Bind → PostBind.
//!
//! Plugins are constructed once with their validated arguments and are
//! invoked stateless afterwards; anything per-attempt belongs in the
//! cycle state. Filter and Score are fanned out across candidate
//! nodes, so those invocations must not mutate shared state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::context::CycleContext;
use crate::cycle_state::CycleState;
use crate::node::NodeSnapshot;
use crate::pod::PodInfo;
use crate::status::Status;

/// Upper bound of the per-node score range ([0, MAX_NODE_SCORE]).
pub const MAX_NODE_SCORE: i64 = 100;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
}

/// Runs once per workload before node fan-out; typically precomputes
/// demand into the cycle state.
pub trait PreFilterPlugin: Plugin {
    fn pre_filter(&self, ctx: &CycleContext, state: &mut CycleState, pod: &PodInfo) -> Status;
}

/// Feasibility check for one workload on one node.
pub trait FilterPlugin: Plugin {
    fn filter(
        &self,
        ctx: &CycleContext,
        state: &CycleState,
        pod: &PodInfo,
        node: &NodeSnapshot,
    ) -> Status;
}

/// Victim selection after all nodes failed Filter.
pub trait PostFilterPlugin: Plugin {
    fn post_filter(
        &self,
        ctx: &CycleContext,
        state: &mut CycleState,
        pod: &PodInfo,
        nodes: &[Arc<NodeSnapshot>],
        filter_statuses: &HashMap<String, Status>,
    ) -> Status;
}

pub trait PreScorePlugin: Plugin {
    fn pre_score(
        &self,
        ctx: &CycleContext,
        state: &mut CycleState,
        pod: &PodInfo,
        nodes: &[Arc<NodeSnapshot>],
    ) -> Status;
}

/// Preference score for one workload on one feasible node, in
/// [0, MAX_NODE_SCORE].
pub trait ScorePlugin: Plugin {
    fn score(
        &self,
        ctx: &CycleContext,
        state: &CycleState,
        pod: &PodInfo,
        node: &NodeSnapshot,
    ) -> (i64, Status);
}

/// Tentative occupancy bookkeeping once a node has been chosen.
/// `unreserve` must undo whatever `reserve` did; it runs in reverse
/// registration order when an attempt is rolled back.
pub trait ReservePlugin: Plugin {
    fn reserve(
        &self,
        ctx: &CycleContext,
        state: &mut CycleState,
        pod: &PodInfo,
        node_name: &str,
    ) -> Status;

    fn unreserve(&self, ctx: &CycleContext, state: &mut CycleState, pod: &PodInfo, node_name: &str);
}

/// Last gate before binding. A `Wait` status holds the workload for at
/// most the returned duration.
pub trait PermitPlugin: Plugin {
    fn permit(
        &self,
        ctx: &CycleContext,
        state: &CycleState,
        pod: &PodInfo,
        node_name: &str,
    ) -> (Status, Duration);
}

pub trait PreBindPlugin: Plugin {
    fn pre_bind(
        &self,
        ctx: &CycleContext,
        state: &CycleState,
        pod: &PodInfo,
        node_name: &str,
    ) -> Status;
}

pub trait BindPlugin: Plugin {
    fn bind(
        &self,
        ctx: &CycleContext,
        state: &CycleState,
        pod: &PodInfo,
        node_name: &str,
    ) -> Status;
}

/// Informational hook after a successful bind; cannot fail the cycle.
pub trait PostBindPlugin: Plugin {
    fn post_bind(&self, ctx: &CycleContext, state: &CycleState, pod: &PodInfo, node_name: &str);
}
