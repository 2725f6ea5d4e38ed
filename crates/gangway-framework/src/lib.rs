//! gangway-framework — the scheduling API surface.
//!
//! Everything the placement pipeline and its plugins agree on lives
//! here:
//!
//! - **`resource`** — the resource vector and its saturating arithmetic
//! - **`demand`** — aggregation of a workload's containers into one demand vector
//! - **`pod`** — workload items and their queued wrappers
//! - **`group`** — co-scheduling group specs (gangs)
//! - **`unit`** — the scheduling unit: a single workload or a gang
//! - **`node`** — point-in-time node snapshots
//! - **`cycle_state`** — the per-attempt scratchpad shared across stages
//! - **`status`** — stage status codes and aggregation rules
//! - **`reservation`** — tentative per-node occupancy during an attempt
//! - **`plugin`** — the extension-point traits plugins implement

pub mod context;
pub mod cycle_state;
pub mod demand;
pub mod error;
pub mod group;
pub mod node;
pub mod plugin;
pub mod pod;
pub mod reservation;
pub mod resource;
pub mod status;
pub mod unit;

pub use context::CycleContext;
pub use cycle_state::{CycleState, StateData};
pub use demand::compute_pod_resource_request;
pub use error::{FrameworkError, FrameworkResult};
pub use group::{GroupAffinity, NodeSelector, PodGroup, SortRule, UnitAffinityTerm};
pub use node::NodeSnapshot;
pub use plugin::{
    BindPlugin, FilterPlugin, PermitPlugin, Plugin, PostBindPlugin, PostFilterPlugin,
    PreBindPlugin, PreFilterPlugin, PreScorePlugin, ReservePlugin, ScorePlugin, MAX_NODE_SCORE,
};
pub use pod::{Container, PodInfo, PodLauncher, PodResourceType, QueuedPodInfo, Uid};
pub use reservation::{ReservationPlaceholderMap, ReservationPlaceholdersOfNodes};
pub use resource::{Resource, ResourceName};
pub use status::{Code, Status};
pub use unit::{PodGroupUnit, SchedulingUnit, SinglePodUnit, UnitType};
