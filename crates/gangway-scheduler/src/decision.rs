//! Outbound decisions consumed by the commit collaborator.

use std::sync::Mutex;

use thiserror::Error;

use gangway_framework::pod::Uid;
use gangway_framework::reservation::ReservationPlaceholdersOfNodes;

/// Failure reported by a decision sink.
#[derive(Debug, Error)]
#[error("decision sink failure: {0}")]
pub struct SinkError(pub String);

/// One scheduling decision for one workload.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Place the workload on the named node. `reservations` carries
    /// the attempt's full tentative occupancy for the commit layer.
    Bind {
        pod_uid: Uid,
        node_name: String,
        reservations: ReservationPlaceholdersOfNodes,
    },
    /// The workload could not be placed.
    Unschedulable {
        pod_uid: Uid,
        reason: String,
        failed_plugins: Vec<String>,
        /// Whether the queue will retry; `false` for
        /// unschedulable-and-unresolvable outcomes and gang timeouts.
        retryable: bool,
    },
}

impl Decision {
    pub fn pod_uid(&self) -> &str {
        match self {
            Decision::Bind { pod_uid, .. } => pod_uid,
            Decision::Unschedulable { pod_uid, .. } => pod_uid,
        }
    }
}

/// The commit collaborator: receives decisions, performs the actual
/// binding RPCs elsewhere.
pub trait DecisionSink: Send + Sync {
    fn submit(&self, decision: Decision) -> Result<(), SinkError>;
}

/// In-memory sink collecting decisions, for tests and dry runs.
#[derive(Default)]
pub struct RecordingSink {
    decisions: Mutex<Vec<Decision>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(&self) -> Vec<Decision> {
        self.decisions.lock().unwrap().clone()
    }
}

impl DecisionSink for RecordingSink {
    fn submit(&self, decision: Decision) -> Result<(), SinkError> {
        self.decisions.lock().unwrap().push(decision);
        Ok(())
    }
}
