//! Workload items (pods) and their queued wrappers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::Resource;

/// Unique identifier of a workload item, stable across updates.
pub type Uid = String;

/// Annotation keys consumed by the scheduler. These are stable API.
pub const POD_LAUNCHER_ANNOTATION_KEY: &str = "pod-launcher";
pub const POD_RESOURCE_TYPE_ANNOTATION_KEY: &str = "pod-resource-type";
pub const POD_GROUP_NAME_ANNOTATION_KEY: &str = "pod-group-name";
/// Presence (any value) excludes the workload from node pod-count caps.
pub const IGNORE_PODS_LIMIT_ANNOTATION_KEY: &str = "ignore-pods-limit";
pub const DEBUG_MODE_ANNOTATION_KEY: &str = "debug-mode";
pub const DEBUG_MODE_ON: &str = "on";

/// Priority assigned to workloads that don't carry one.
pub const DEFAULT_POD_PRIORITY: i32 = 100;

/// Executor class that will run the workload on the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodLauncher {
    Kubelet,
    NodeManager,
}

/// Resource accounting class of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodResourceType {
    Guaranteed,
    BestEffort,
}

impl PodResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodResourceType::Guaranteed => "Guaranteed",
            PodResourceType::BestEffort => "BestEffort",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Guaranteed" => Some(PodResourceType::Guaranteed),
            "BestEffort" => Some(PodResourceType::BestEffort),
            _ => None,
        }
    }
}

/// A single container and its resource requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub requests: Resource,
}

/// An immutable workload item as delivered by the cluster-state
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInfo {
    pub namespace: String,
    pub name: String,
    pub uid: Uid,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub init_containers: Vec<Container>,
    /// Runtime overhead charged on top of container requests.
    #[serde(default)]
    pub overhead: Option<Resource>,
    /// Scheduling priority; `None` means the default.
    #[serde(default)]
    pub priority: Option<i32>,
    /// Monotonic per-object version, used to reconcile out-of-order events.
    #[serde(default)]
    pub resource_version: u64,
    pub creation_timestamp: DateTime<Utc>,
}

impl PodInfo {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        uid: impl Into<Uid>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: uid.into(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            containers: Vec::new(),
            init_containers: Vec::new(),
            overhead: None,
            priority: None,
            resource_version: 0,
            creation_timestamp: Utc::now(),
        }
    }

    /// `namespace/name`, the human-readable identity.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or(DEFAULT_POD_PRIORITY)
    }

    pub fn launcher(&self) -> Option<PodLauncher> {
        match self.annotations.get(POD_LAUNCHER_ANNOTATION_KEY)?.as_str() {
            "Kubelet" => Some(PodLauncher::Kubelet),
            "NodeManager" => Some(PodLauncher::NodeManager),
            _ => None,
        }
    }

    pub fn resource_type(&self) -> PodResourceType {
        self.annotations
            .get(POD_RESOURCE_TYPE_ANNOTATION_KEY)
            .and_then(|v| PodResourceType::parse(v))
            .unwrap_or(PodResourceType::Guaranteed)
    }

    /// Name of the co-scheduling group this workload belongs to, if any.
    pub fn group_name(&self) -> Option<&str> {
        self.annotations
            .get(POD_GROUP_NAME_ANNOTATION_KEY)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Whether this workload is excluded from the node pod-count cap.
    pub fn ignores_pod_limit(&self) -> bool {
        self.annotations.contains_key(IGNORE_PODS_LIMIT_ANNOTATION_KEY)
    }

    pub fn is_debug_mode_on(&self) -> bool {
        self.annotations
            .get(DEBUG_MODE_ANNOTATION_KEY)
            .is_some_and(|v| v == DEBUG_MODE_ON)
    }
}

/// A workload item plus its queue bookkeeping. Identity key is the
/// pod's `uid`.
#[derive(Debug, Clone)]
pub struct QueuedPodInfo {
    pub pod: Arc<PodInfo>,
    /// When the pod was (last) added to the scheduling queue.
    pub timestamp: DateTime<Utc>,
    /// Number of placement attempts so far.
    pub attempts: u32,
    /// When the pod was first enqueued. Never updated afterwards; used
    /// for end-to-end latency accounting.
    pub initial_attempt_timestamp: DateTime<Utc>,
    /// Last observed unschedulable reason, if any.
    pub unschedulable_reason: Option<String>,
}

impl QueuedPodInfo {
    pub fn new(pod: Arc<PodInfo>, now: DateTime<Utc>) -> Self {
        Self {
            pod,
            timestamp: now,
            attempts: 0,
            initial_attempt_timestamp: now,
            unschedulable_reason: None,
        }
    }

    pub fn uid(&self) -> &str {
        &self.pod.uid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_defaults_to_100() {
        let pod = PodInfo::new("default", "web", "uid-1");
        assert_eq!(pod.priority(), 100);

        let mut pod = PodInfo::new("default", "web", "uid-1");
        pod.priority = Some(7);
        assert_eq!(pod.priority(), 7);
    }

    #[test]
    fn annotation_accessors() {
        let mut pod = PodInfo::new("default", "web", "uid-1");
        pod.annotations
            .insert(POD_LAUNCHER_ANNOTATION_KEY.to_string(), "Kubelet".to_string());
        pod.annotations
            .insert(POD_GROUP_NAME_ANNOTATION_KEY.to_string(), "ml-gang".to_string());
        pod.annotations
            .insert(IGNORE_PODS_LIMIT_ANNOTATION_KEY.to_string(), String::new());
        pod.annotations
            .insert(DEBUG_MODE_ANNOTATION_KEY.to_string(), "on".to_string());
        pod.annotations.insert(
            POD_RESOURCE_TYPE_ANNOTATION_KEY.to_string(),
            "BestEffort".to_string(),
        );

        assert_eq!(pod.launcher(), Some(PodLauncher::Kubelet));
        assert_eq!(pod.group_name(), Some("ml-gang"));
        assert!(pod.ignores_pod_limit());
        assert!(pod.is_debug_mode_on());
        assert_eq!(pod.resource_type(), PodResourceType::BestEffort);
    }

    #[test]
    fn ignore_pods_limit_is_presence_based() {
        let mut pod = PodInfo::new("default", "web", "uid-1");
        assert!(!pod.ignores_pod_limit());
        // Any value counts, including empty.
        pod.annotations
            .insert(IGNORE_PODS_LIMIT_ANNOTATION_KEY.to_string(), "whatever".to_string());
        assert!(pod.ignores_pod_limit());
    }

    #[test]
    fn debug_mode_requires_exact_value() {
        let mut pod = PodInfo::new("default", "web", "uid-1");
        pod.annotations
            .insert(DEBUG_MODE_ANNOTATION_KEY.to_string(), "yes".to_string());
        assert!(!pod.is_debug_mode_on());
    }
}
