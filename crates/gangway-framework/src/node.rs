//! Point-in-time node snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use crate::demand::compute_pod_resource_request;
use crate::pod::{PodInfo, Uid};
use crate::resource::Resource;

/// A node as the scheduler sees it during one placement cycle.
///
/// `capacity` is the raw resource total; `allocatable` subtracts system
/// reservations and is what placement charges against. `requested` is
/// derived: the sum of resident pod demands, kept in sync by
/// [`NodeSnapshot::add_pod`] / [`NodeSnapshot::remove_pod`].
#[derive(Debug, Clone, Default)]
pub struct NodeSnapshot {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub capacity: Resource,
    pub allocatable: Resource,
    pub resource_version: u64,
    pods: HashMap<Uid, Arc<PodInfo>>,
    requested: Resource,
}

impl NodeSnapshot {
    pub fn new(name: impl Into<String>, capacity: Resource, allocatable: Resource) -> Self {
        Self {
            name: name.into(),
            labels: HashMap::new(),
            capacity,
            allocatable,
            resource_version: 0,
            pods: HashMap::new(),
            requested: Resource::new(),
        }
    }

    /// Fold a resident pod's demand into the snapshot.
    pub fn add_pod(&mut self, pod: Arc<PodInfo>) {
        let request = compute_pod_resource_request(&pod);
        self.requested.add(&request);
        self.pods.insert(pod.uid.clone(), pod);
    }

    /// Remove a resident pod and release its demand.
    pub fn remove_pod(&mut self, uid: &str) -> Option<Arc<PodInfo>> {
        let pod = self.pods.remove(uid)?;
        let request = compute_pod_resource_request(&pod);
        self.requested.sub(&request);
        Some(pod)
    }

    pub fn num_pods(&self) -> usize {
        self.pods.len()
    }

    pub fn pods(&self) -> impl Iterator<Item = &Arc<PodInfo>> {
        self.pods.values()
    }

    /// Sum of resident pod demands.
    pub fn requested(&self) -> &Resource {
        &self.requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::Container;

    fn resources(milli_cpu: i64, memory: i64) -> Resource {
        Resource {
            milli_cpu,
            memory,
            ..Default::default()
        }
    }

    fn resource_pod(uid: &str, milli_cpu: i64, memory: i64) -> Arc<PodInfo> {
        let mut pod = PodInfo::new("default", uid, uid);
        pod.containers = vec![Container {
            name: String::new(),
            requests: resources(milli_cpu, memory),
        }];
        Arc::new(pod)
    }

    #[test]
    fn add_and_remove_keep_requested_in_sync() {
        let mut node = NodeSnapshot::new("node-1", resources(10, 20), resources(10, 20));
        node.add_pod(resource_pod("a", 4, 8));
        node.add_pod(resource_pod("b", 2, 2));
        assert_eq!(node.requested().milli_cpu, 6);
        assert_eq!(node.requested().memory, 10);
        assert_eq!(node.num_pods(), 2);

        node.remove_pod("a");
        assert_eq!(node.requested().milli_cpu, 2);
        assert_eq!(node.requested().memory, 2);
        assert_eq!(node.num_pods(), 1);
    }

    #[test]
    fn remove_unknown_pod_is_none() {
        let mut node = NodeSnapshot::new("node-1", resources(10, 20), resources(10, 20));
        assert!(node.remove_pod("ghost").is_none());
        assert_eq!(node.requested().milli_cpu, 0);
    }
}
