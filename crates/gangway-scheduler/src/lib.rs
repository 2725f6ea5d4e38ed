//! gangway-scheduler — the placement pipeline and scheduling loop.
//!
//! Ties the other crates together:
//!
//! ```text
//! Scheduler
//!   ├── SharedUnitQueue (priority ordering, gang readiness, timeouts)
//!   ├── ClusterSnapshot (authoritative node view, assumed pods)
//!   ├── PluginRegistry (ordered plugins per extension point)
//!   │     PreFilter → Filter → PostFilter → PreScore → Score
//!   │     → Reserve → Permit → PreBind → Bind → PostBind
//!   └── DecisionSink (Bind / Unschedulable, consumed by the commit layer)
//! ```
//!
//! Workers pop ready units, drive every member through the pipeline
//! against a reservation overlay, and fold the result into the
//! snapshot only when the whole unit commits.

pub mod config;
pub mod decision;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod snapshot;

pub use config::{build_registry, default_profile, PluginConfig, PluginSet, SchedulerProfile};
pub use decision::{Decision, DecisionSink, RecordingSink, SinkError};
pub use error::{SchedulerError, SchedulerResult};
pub use pipeline::{collect_filter_failure, select_node, NodeFilterResult, NodeScore};
pub use registry::{PluginRegistry, RegistryBuilder, ScoreEntry};
pub use scheduler::{Placement, Scheduler, UnitOutcome, UnitResult, ERR_REASON_NO_NODES};
pub use snapshot::ClusterSnapshot;
