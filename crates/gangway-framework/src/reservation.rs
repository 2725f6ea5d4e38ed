//! Tentative per-node occupancy recorded during a placement attempt.
//!
//! Reservations let gang placement and victim accounting charge a node
//! before anything is committed. They live for exactly one attempt and
//! are folded into the authoritative snapshot only on successful bind.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::pod::PodInfo;

/// Placeholders on one node, keyed by the workload's `namespace/name`.
#[derive(Debug, Clone, Default)]
pub struct ReservationPlaceholderMap(pub HashMap<String, Arc<PodInfo>>);

impl ReservationPlaceholderMap {
    pub fn insert(&mut self, pod: Arc<PodInfo>) {
        self.0.insert(pod.full_name(), pod);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn pods(&self) -> impl Iterator<Item = &Arc<PodInfo>> {
        self.0.values()
    }
}

impl fmt::Display for ReservationPlaceholderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.0.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        f.write_str(&keys.join(", "))
    }
}

/// All placeholders of an attempt, keyed by node name.
#[derive(Debug, Clone, Default)]
pub struct ReservationPlaceholdersOfNodes(pub HashMap<String, ReservationPlaceholderMap>);

impl ReservationPlaceholdersOfNodes {
    pub fn reserve(&mut self, node_name: impl Into<String>, pod: Arc<PodInfo>) {
        self.0.entry(node_name.into()).or_default().insert(pod);
    }

    pub fn on_node(&self, node_name: &str) -> Option<&ReservationPlaceholderMap> {
        self.0.get(node_name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Display for ReservationPlaceholdersOfNodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<&String> = self.0.keys().collect();
        nodes.sort_unstable();
        let rendered: Vec<String> = nodes
            .into_iter()
            .map(|node| format!("{}: {}", node, self.0[node]))
            .collect();
        f.write_str(&rendered.join("; "))
    }
}
