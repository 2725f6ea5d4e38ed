//! Authoritative cluster view fed by inbound events.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use gangway_framework::node::NodeSnapshot;
use gangway_framework::pod::{PodInfo, Uid};
use gangway_framework::{FrameworkError, FrameworkResult};

/// All known nodes plus which node each assumed pod landed on.
///
/// Read-only within a placement cycle; successful binds fold pods in
/// through [`ClusterSnapshot::assume_pod`].
#[derive(Default)]
pub struct ClusterSnapshot {
    nodes: HashMap<String, Arc<NodeSnapshot>>,
    assumed: HashMap<Uid, String>,
}

impl ClusterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a node. Out-of-order updates (older resource
    /// version than what we hold) are dropped.
    pub fn upsert_node(&mut self, node: NodeSnapshot) {
        if let Some(existing) = self.nodes.get(&node.name) {
            if existing.resource_version > node.resource_version {
                debug!(
                    node = %node.name,
                    held = existing.resource_version,
                    received = node.resource_version,
                    "dropping out-of-order node update"
                );
                return;
            }
        }
        self.nodes.insert(node.name.clone(), Arc::new(node));
    }

    pub fn remove_node(&mut self, name: &str) -> Option<Arc<NodeSnapshot>> {
        let node = self.nodes.remove(name)?;
        self.assumed.retain(|_, n| n != name);
        Some(node)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<NodeSnapshot>> {
        self.nodes.get(name)
    }

    /// Stable-ordered list of nodes for a placement cycle.
    pub fn nodes(&self) -> Vec<Arc<NodeSnapshot>> {
        let mut nodes: Vec<Arc<NodeSnapshot>> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fold a placed pod into its node after a successful bind.
    pub fn assume_pod(&mut self, node_name: &str, pod: Arc<PodInfo>) -> FrameworkResult<()> {
        let node = self
            .nodes
            .get_mut(node_name)
            .ok_or_else(|| FrameworkError::UnknownNode(node_name.to_string()))?;
        let uid = pod.uid.clone();
        Arc::make_mut(node).add_pod(pod);
        self.assumed.insert(uid, node_name.to_string());
        Ok(())
    }

    /// Release an assumed pod, e.g. on delete events.
    pub fn forget_pod(&mut self, uid: &str) {
        if let Some(node_name) = self.assumed.remove(uid) {
            if let Some(node) = self.nodes.get_mut(&node_name) {
                Arc::make_mut(node).remove_pod(uid);
            }
        }
    }

    /// Which node an assumed pod sits on, if any.
    pub fn assumed_node(&self, uid: &str) -> Option<&str> {
        self.assumed.get(uid).map(|s| s.as_str())
    }
}
