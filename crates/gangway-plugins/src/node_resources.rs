//! The node-resource fitness evaluator and its Filter plugin.
//!
//! `fits_request` reconciles a workload's aggregated demand against a
//! node's allocatable capacity and resident pods, reporting the first
//! failing resource in a fixed order: pod count, CPU, memory,
//! ephemeral storage, then scalar resources sorted by name. The fixed
//! order keeps diagnostics reproducible across runs.

use std::any::Any;
use std::collections::HashSet;

use tracing::debug;

use gangway_framework::cycle_state::{CycleState, StateData};
use gangway_framework::demand::compute_pod_resource_request;
use gangway_framework::node::NodeSnapshot;
use gangway_framework::plugin::{FilterPlugin, Plugin, PreFilterPlugin};
use gangway_framework::pod::PodInfo;
use gangway_framework::resource::{
    Resource, RESOURCE_CPU, RESOURCE_EPHEMERAL_STORAGE, RESOURCE_MEMORY, RESOURCE_PODS,
};
use gangway_framework::status::Status;
use gangway_framework::CycleContext;

use crate::args::NodeResourcesFitArgs;
use crate::error::PluginResult;
use crate::validation::validate_fit_args;

/// Cycle-state key the Fit plugin writes in PreFilter and reads in
/// Filter.
pub const PRE_FILTER_NODE_RESOURCES_FIT: &str = "PreFilterNodeResourcesFit";

/// Diagnostic for a node that cannot admit another workload.
pub const ERR_REASON_TOO_MANY_PODS: &str = "node(s) had too many pods";

/// A structured first-failure diagnostic. `capacity` is the node's
/// allocatable quantity, `used` the sum of resident pod demands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientResource {
    pub resource_name: String,
    pub reason: String,
    pub requested: i64,
    pub used: i64,
    pub capacity: i64,
}

fn unsatisfied_reason(requested: i64, resource_name: &str) -> String {
    format!("node(s) could not satisfy {requested} {resource_name} request")
}

/// Check whether `request` fits on `node`, honoring ignore lists.
///
/// Returns the first failing resource in the deterministic order
/// described in the module docs, or `None` when everything fits.
/// Zero-valued demand components are skipped (apart from the pod
/// count, which is presence-based).
pub fn fits_request(
    request: &Resource,
    node: &NodeSnapshot,
    ignored_resources: &HashSet<String>,
    ignored_resource_groups: &HashSet<String>,
) -> Option<InsufficientResource> {
    if request.allowed_pod_number == 1
        && node.num_pods() as i64 >= node.allocatable.allowed_pod_number
    {
        return Some(InsufficientResource {
            resource_name: RESOURCE_PODS.to_string(),
            reason: ERR_REASON_TOO_MANY_PODS.to_string(),
            requested: 1,
            used: node.num_pods() as i64,
            capacity: node.allocatable.allowed_pod_number,
        });
    }

    let used = node.requested();
    let fixed_checks = [
        (RESOURCE_CPU, request.milli_cpu, used.milli_cpu, node.allocatable.milli_cpu),
        (RESOURCE_MEMORY, request.memory, used.memory, node.allocatable.memory),
        (
            RESOURCE_EPHEMERAL_STORAGE,
            request.ephemeral_storage,
            used.ephemeral_storage,
            node.allocatable.ephemeral_storage,
        ),
    ];
    for (name, requested, used, capacity) in fixed_checks {
        if requested > 0 && used + requested > capacity {
            return Some(InsufficientResource {
                resource_name: name.to_string(),
                reason: unsatisfied_reason(requested, name),
                requested,
                used,
                capacity,
            });
        }
    }

    // BTreeMap iteration is sorted by name, so the first failure is
    // deterministic.
    for (name, &requested) in &request.scalar_resources {
        if requested == 0 || ignored_resources.contains(name) {
            continue;
        }
        if let Some((group, _)) = name.split_once('/') {
            if ignored_resource_groups.contains(group) {
                continue;
            }
        }
        let scalar_used = used.scalar(name);
        let capacity = node.allocatable.scalar(name);
        if scalar_used + requested > capacity {
            return Some(InsufficientResource {
                resource_name: name.clone(),
                reason: unsatisfied_reason(requested, name),
                requested,
                used: scalar_used,
                capacity,
            });
        }
    }

    None
}

/// Demand computed once in PreFilter and shared by every per-node
/// Filter invocation.
#[derive(Debug, Clone)]
pub struct PreFilterState {
    pub resource_request: Resource,
}

impl StateData for PreFilterState {
    fn clone_data(&self) -> Box<dyn StateData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The default Filter plugin: node-resource fitness.
pub struct Fit {
    ignored_resources: HashSet<String>,
    ignored_resource_groups: HashSet<String>,
}

impl Fit {
    pub const NAME: &'static str = "NodeResourcesFit";

    /// Construct from validated arguments; bad arguments fail here and
    /// are never retried.
    pub fn new(args: &NodeResourcesFitArgs) -> PluginResult<Self> {
        validate_fit_args(args)?;
        Ok(Self {
            ignored_resources: args.ignored_resources.iter().cloned().collect(),
            ignored_resource_groups: args.ignored_resource_groups.iter().cloned().collect(),
        })
    }
}

impl Plugin for Fit {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl PreFilterPlugin for Fit {
    fn pre_filter(&self, _ctx: &CycleContext, state: &mut CycleState, pod: &PodInfo) -> Status {
        let resource_request = compute_pod_resource_request(pod);
        state.write(
            PRE_FILTER_NODE_RESOURCES_FIT,
            Box::new(PreFilterState { resource_request }),
        );
        Status::success()
    }
}

impl FilterPlugin for Fit {
    fn filter(
        &self,
        _ctx: &CycleContext,
        state: &CycleState,
        pod: &PodInfo,
        node: &NodeSnapshot,
    ) -> Status {
        let prefilter: &PreFilterState = match state.read_as(PRE_FILTER_NODE_RESOURCES_FIT) {
            Ok(data) => data,
            Err(err) => return Status::error(err.to_string()),
        };

        match fits_request(
            &prefilter.resource_request,
            node,
            &self.ignored_resources,
            &self.ignored_resource_groups,
        ) {
            None => Status::success(),
            Some(insufficient) => {
                debug!(
                    pod = %pod.full_name(),
                    node = %node.name,
                    resource = %insufficient.resource_name,
                    requested = insufficient.requested,
                    used = insufficient.used,
                    capacity = insufficient.capacity,
                    "node rejected by resource fit"
                );
                Status::unschedulable(insufficient.reason).with_failed_plugin(Self::NAME)
            }
        }
    }
}
