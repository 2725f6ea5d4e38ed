//! gangway-plugins — built-in pipeline plugins and their typed
//! arguments.
//!
//! - **`args`** — one typed configuration struct per plugin, parsed
//!   from JSON with unknown fields rejected
//! - **`validation`** — argument validation shared by plugin
//!   constructors
//! - **`node_resources`** — the node-resource fitness evaluator, the
//!   default Filter plugin
//! - **`node_label`** — label presence/absence filtering and scoring
//! - **`least_allocated`** — balanced-utilization scoring

pub mod args;
pub mod error;
pub mod least_allocated;
pub mod node_label;
pub mod node_resources;
pub mod validation;

pub use args::{
    InterPodAffinityArgs, LoadAwareArgs, LocalStoragePoolCheckerArgs, NodeLabelArgs,
    NodeLoadArgs, NodeResourcesBalancedAllocationArgs, NodeResourcesFitArgs,
    NodeResourcesLeastAllocatedArgs, NodeResourcesMostAllocatedArgs, PodTopologySpreadArgs,
    RequestedToCapacityRatioArgs, ResourceSpec, ScorePolicy, ServiceAffinityArgs,
    StartRecentlyArgs, TopologySpreadConstraint, UtilizationShapePoint, VolumeBindingArgs,
};
pub use error::{PluginError, PluginResult};
pub use least_allocated::NodeResourcesLeastAllocated;
pub use node_label::NodeLabel;
pub use node_resources::{
    fits_request, Fit, InsufficientResource, PreFilterState, ERR_REASON_TOO_MANY_PODS,
    PRE_FILTER_NODE_RESOURCES_FIT,
};
