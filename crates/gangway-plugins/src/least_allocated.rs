//! Least-allocated scoring: prefer the node that stays emptiest after
//! placement, per weighted resource.

use gangway_framework::cycle_state::CycleState;
use gangway_framework::demand::compute_pod_resource_request;
use gangway_framework::node::NodeSnapshot;
use gangway_framework::plugin::{Plugin, ScorePlugin, MAX_NODE_SCORE};
use gangway_framework::pod::PodInfo;
use gangway_framework::resource::{
    Resource, RESOURCE_CPU, RESOURCE_EPHEMERAL_STORAGE, RESOURCE_MEMORY,
};
use gangway_framework::status::Status;
use gangway_framework::CycleContext;

use crate::args::{NodeResourcesLeastAllocatedArgs, ResourceSpec};
use crate::error::PluginResult;
use crate::validation::validate_resource_specs;

fn quantity(resource: &Resource, name: &str) -> i64 {
    match name {
        RESOURCE_CPU => resource.milli_cpu,
        RESOURCE_MEMORY => resource.memory,
        RESOURCE_EPHEMERAL_STORAGE => resource.ephemeral_storage,
        other => resource.scalar(other),
    }
}

/// Score plugin favoring nodes with the lowest post-placement
/// utilization across the configured resources.
pub struct NodeResourcesLeastAllocated {
    resources: Vec<ResourceSpec>,
}

impl NodeResourcesLeastAllocated {
    pub const NAME: &'static str = "NodeResourcesLeastAllocated";

    pub fn new(args: &NodeResourcesLeastAllocatedArgs) -> PluginResult<Self> {
        validate_resource_specs(Self::NAME, &args.resources)?;
        let resources = if args.resources.is_empty() {
            vec![
                ResourceSpec::new(RESOURCE_CPU, 1),
                ResourceSpec::new(RESOURCE_MEMORY, 1),
            ]
        } else {
            args.resources.clone()
        };
        Ok(Self { resources })
    }

    /// `(allocatable - used) * MAX / allocatable`, zero when the node
    /// has no capacity or is already over-committed.
    fn least_allocated_score(used: i64, allocatable: i64) -> i64 {
        if allocatable <= 0 || used > allocatable {
            return 0;
        }
        (allocatable - used) * MAX_NODE_SCORE / allocatable
    }
}

impl Plugin for NodeResourcesLeastAllocated {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl ScorePlugin for NodeResourcesLeastAllocated {
    fn score(
        &self,
        _ctx: &CycleContext,
        _state: &CycleState,
        pod: &PodInfo,
        node: &NodeSnapshot,
    ) -> (i64, Status) {
        let request = compute_pod_resource_request(pod);

        let mut weighted = 0i64;
        let mut weight_sum = 0i64;
        for spec in &self.resources {
            let used = quantity(node.requested(), &spec.name) + quantity(&request, &spec.name);
            let allocatable = quantity(&node.allocatable, &spec.name);
            weighted += Self::least_allocated_score(used, allocatable) * spec.weight;
            weight_sum += spec.weight;
        }

        if weight_sum == 0 {
            return (0, Status::success());
        }
        (weighted / weight_sum, Status::success())
    }
}
