//! Co-scheduling group (gang) specifications.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort dimension applied when no explicit one is configured.
pub const SORT_DIMENSION_CAPACITY: &str = "Capacity";

/// A topology term constraining where gang members may land relative
/// to each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAffinityTerm {
    pub topology_key: String,
}

/// Node label constraints attached to a group's affinity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelector {
    pub match_labels: HashMap<String, String>,
}

/// Ordering rule for candidate topology domains.
///
/// `resource`, `dimension` and `order` are open string sets: unknown
/// values flow through to the consuming plugin unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRule {
    pub resource: String,
    #[serde(default)]
    pub dimension: String,
    pub order: String,
}

/// Affinity block of a group spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupAffinity {
    #[serde(default)]
    pub required: Vec<UnitAffinityTerm>,
    #[serde(default)]
    pub preferred: Vec<UnitAffinityTerm>,
    #[serde(default)]
    pub node_selector: Option<NodeSelector>,
    #[serde(default)]
    pub sort_rules: Vec<SortRule>,
}

/// Specification of a co-scheduled group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodGroup {
    pub namespace: String,
    pub name: String,
    /// The gang is placed only when at least this many members can be
    /// placed together.
    pub min_member: u32,
    /// Seconds the group may wait to reach `min_member`; `None` means
    /// the default.
    #[serde(default)]
    pub schedule_timeout_seconds: Option<i32>,
    #[serde(default)]
    pub affinity: Option<GroupAffinity>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub resource_version: u64,
    pub creation_timestamp: DateTime<Utc>,
}

impl PodGroup {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, min_member: u32) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            min_member,
            schedule_timeout_seconds: None,
            affinity: None,
            annotations: HashMap::new(),
            resource_version: 0,
            creation_timestamp: Utc::now(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}
