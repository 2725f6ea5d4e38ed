//! Label presence/absence filtering and scoring.

use gangway_framework::cycle_state::CycleState;
use gangway_framework::node::NodeSnapshot;
use gangway_framework::plugin::{FilterPlugin, Plugin, ScorePlugin, MAX_NODE_SCORE};
use gangway_framework::pod::PodInfo;
use gangway_framework::status::Status;
use gangway_framework::CycleContext;

use crate::args::NodeLabelArgs;
use crate::error::PluginResult;
use crate::validation::validate_node_label_args;

/// Diagnostic for nodes rejected on label constraints.
pub const ERR_REASON_LABELS: &str = "node(s) didn't have the requested labels";

/// Filters on required label presence/absence and scores soft label
/// preferences.
pub struct NodeLabel {
    args: NodeLabelArgs,
}

impl NodeLabel {
    pub const NAME: &'static str = "NodeLabel";

    pub fn new(args: &NodeLabelArgs) -> PluginResult<Self> {
        validate_node_label_args(args)?;
        Ok(Self { args: args.clone() })
    }
}

impl Plugin for NodeLabel {
    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl FilterPlugin for NodeLabel {
    fn filter(
        &self,
        _ctx: &CycleContext,
        _state: &CycleState,
        _pod: &PodInfo,
        node: &NodeSnapshot,
    ) -> Status {
        let present_ok = self
            .args
            .present_labels
            .iter()
            .all(|l| node.labels.contains_key(l));
        let absent_ok = self
            .args
            .absent_labels
            .iter()
            .all(|l| !node.labels.contains_key(l));
        if present_ok && absent_ok {
            Status::success()
        } else {
            // A missing required label won't appear by retrying this node,
            // but another node may carry it.
            Status::unschedulable(ERR_REASON_LABELS).with_failed_plugin(Self::NAME)
        }
    }
}

impl ScorePlugin for NodeLabel {
    fn score(
        &self,
        _ctx: &CycleContext,
        _state: &CycleState,
        _pod: &PodInfo,
        node: &NodeSnapshot,
    ) -> (i64, Status) {
        let total = self.args.present_labels_preference.len()
            + self.args.absent_labels_preference.len();
        if total == 0 {
            return (0, Status::success());
        }
        let matched = self
            .args
            .present_labels_preference
            .iter()
            .filter(|l| node.labels.contains_key(*l))
            .count()
            + self
                .args
                .absent_labels_preference
                .iter()
                .filter(|l| !node.labels.contains_key(*l))
                .count();
        ((matched as i64 * MAX_NODE_SCORE) / total as i64, Status::success())
    }
}
