//! The scheduling unit: a single workload or a co-scheduled gang.
//!
//! Units are the granularity the queue and the pipeline operate on.
//! They come in two shapes with one shared operation set, modeled as a
//! tagged variant rather than trait objects so ownership and mutation
//! stay simple.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{FrameworkError, FrameworkResult};
use crate::group::{NodeSelector, PodGroup, SortRule, UnitAffinityTerm, SORT_DIMENSION_CAPACITY};
use crate::pod::{
    PodInfo, QueuedPodInfo, Uid, DEBUG_MODE_ANNOTATION_KEY, DEBUG_MODE_ON, DEFAULT_POD_PRIORITY,
};

/// Gang timeout applied when a group spec doesn't set one.
pub const DEFAULT_GANG_TIMEOUT_SECONDS: i32 = 300;

/// The two unit shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitType {
    Single,
    Group,
}

impl UnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Single => "single",
            UnitType::Group => "group",
        }
    }
}

/// A unit holding exactly one workload.
#[derive(Debug, Clone)]
pub struct SinglePodUnit {
    key: String,
    pod: Option<QueuedPodInfo>,
}

/// A unit holding the members of a co-scheduled group, keyed by UID.
#[derive(Debug, Clone)]
pub struct PodGroupUnit {
    key: String,
    group: Arc<PodGroup>,
    priority: i32,
    pods: HashMap<Uid, QueuedPodInfo>,
    timestamp: DateTime<Utc>,
}

/// A scheduling unit: either one workload or a gang.
#[derive(Debug, Clone)]
pub enum SchedulingUnit {
    Single(SinglePodUnit),
    Group(PodGroupUnit),
}

fn key_for_single(pod: &PodInfo) -> String {
    format!("{}/{}/{}", UnitType::Single.as_str(), pod.namespace, pod.name)
}

fn key_for_group(group: &PodGroup) -> String {
    format!("{}/{}/{}", UnitType::Group.as_str(), group.namespace, group.name)
}

impl SchedulingUnit {
    pub fn new_single(pod: QueuedPodInfo) -> Self {
        let key = key_for_single(&pod.pod);
        SchedulingUnit::Single(SinglePodUnit { key, pod: Some(pod) })
    }

    pub fn new_group(group: Arc<PodGroup>, priority: i32) -> Self {
        let key = key_for_group(&group);
        SchedulingUnit::Group(PodGroupUnit {
            key,
            group,
            priority,
            pods: HashMap::new(),
            timestamp: Utc::now(),
        })
    }

    pub fn unit_type(&self) -> UnitType {
        match self {
            SchedulingUnit::Single(_) => UnitType::Single,
            SchedulingUnit::Group(_) => UnitType::Group,
        }
    }

    /// The unit's identity key: `single/ns/name` or `group/ns/name`.
    pub fn unit_key(&self) -> &str {
        match self {
            SchedulingUnit::Single(s) => &s.key,
            SchedulingUnit::Group(g) => &g.key,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SchedulingUnit::Single(s) => s
                .pod
                .as_ref()
                .map(|p| p.pod.namespace.as_str())
                .unwrap_or(""),
            SchedulingUnit::Group(g) => &g.group.namespace,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SchedulingUnit::Single(s) => {
                s.pod.as_ref().map(|p| p.pod.name.as_str()).unwrap_or("")
            }
            SchedulingUnit::Group(g) => &g.group.name,
        }
    }

    /// Whether the unit holds enough members to enter placement:
    /// `num_pods() >= min_member` for groups, a present workload for
    /// singles.
    pub fn ready_to_be_populated(&self) -> bool {
        match self {
            SchedulingUnit::Single(s) => s.pod.is_some(),
            SchedulingUnit::Group(g) => g.pods.len() >= g.group.min_member as usize,
        }
    }

    pub fn num_pods(&self) -> usize {
        match self {
            SchedulingUnit::Single(s) => usize::from(s.pod.is_some()),
            SchedulingUnit::Group(g) => g.pods.len(),
        }
    }

    pub fn get_pods(&self) -> Vec<&QueuedPodInfo> {
        match self {
            SchedulingUnit::Single(s) => s.pod.iter().collect(),
            SchedulingUnit::Group(g) => g.pods.values().collect(),
        }
    }

    pub fn get_pod(&self, uid: &str) -> Option<&QueuedPodInfo> {
        match self {
            SchedulingUnit::Single(s) => s.pod.as_ref().filter(|p| p.uid() == uid),
            SchedulingUnit::Group(g) => g.pods.get(uid),
        }
    }

    /// Add a member. On a single unit this replaces the current
    /// workload and recomputes the key; on a group it is idempotent
    /// under UID.
    pub fn add_pod(&mut self, pod: QueuedPodInfo) -> FrameworkResult<()> {
        match self {
            SchedulingUnit::Single(s) => {
                s.key = key_for_single(&pod.pod);
                s.pod = Some(pod);
            }
            SchedulingUnit::Group(g) => {
                g.pods.insert(pod.uid().to_string(), pod);
            }
        }
        Ok(())
    }

    /// Batch add. A single unit only accepts a singleton batch, which
    /// delegates to [`SchedulingUnit::add_pod`].
    pub fn add_pods(&mut self, pods: Vec<QueuedPodInfo>) -> FrameworkResult<()> {
        match self {
            SchedulingUnit::Single(_) => match pods.len() {
                1 => {
                    let pod = pods.into_iter().next().expect("length checked");
                    self.add_pod(pod)
                }
                n => Err(FrameworkError::InvalidPodBatch(n)),
            },
            SchedulingUnit::Group(g) => {
                for pod in pods {
                    g.pods.insert(pod.uid().to_string(), pod);
                }
                Ok(())
            }
        }
    }

    pub fn update_pod(&mut self, pod: QueuedPodInfo) -> FrameworkResult<()> {
        self.add_pod(pod)
    }

    pub fn delete_pod(&mut self, uid: &str) {
        match self {
            SchedulingUnit::Single(s) => {
                if s.pod.as_ref().is_some_and(|p| p.uid() == uid) {
                    s.pod = None;
                }
            }
            SchedulingUnit::Group(g) => {
                g.pods.remove(uid);
            }
        }
    }

    /// Drop all members, e.g. when a gang times out and releases them.
    pub fn reset_pods(&mut self) {
        match self {
            SchedulingUnit::Single(s) => s.pod = None,
            SchedulingUnit::Group(g) => g.pods.clear(),
        }
    }

    /// Stable across calls: the group's assigned priority, or the
    /// single workload's own (defaulted) priority.
    pub fn get_priority(&self) -> i32 {
        match self {
            SchedulingUnit::Single(s) => s
                .pod
                .as_ref()
                .map(|p| p.pod.priority())
                .unwrap_or(DEFAULT_POD_PRIORITY),
            SchedulingUnit::Group(g) => g.priority,
        }
    }

    /// Seconds the unit may wait to gather its members. Zero for
    /// singles (no gang timeout).
    pub fn get_timeout_period(&self) -> i32 {
        match self {
            SchedulingUnit::Single(_) => 0,
            SchedulingUnit::Group(g) => g
                .group
                .schedule_timeout_seconds
                .unwrap_or(DEFAULT_GANG_TIMEOUT_SECONDS),
        }
    }

    pub fn get_min_member(&self) -> u32 {
        match self {
            SchedulingUnit::Single(_) => 1,
            SchedulingUnit::Group(g) => g.group.min_member,
        }
    }

    /// Whether `pod` is a member of this unit. Groups compare the
    /// workload's group-name annotation against `(namespace, name)`;
    /// singles compare identity.
    pub fn pod_belongs_to_unit(&self, pod: &PodInfo) -> bool {
        match self {
            SchedulingUnit::Single(s) => s
                .pod
                .as_ref()
                .is_some_and(|p| p.pod.namespace == pod.namespace && p.pod.name == pod.name),
            SchedulingUnit::Group(g) => match pod.group_name() {
                Some(name) => g.group.name == name && g.group.namespace == pod.namespace,
                None => false,
            },
        }
    }

    pub fn get_required_affinity(&self) -> Vec<UnitAffinityTerm> {
        match self {
            SchedulingUnit::Single(_) => Vec::new(),
            SchedulingUnit::Group(g) => filter_affinity_terms(
                g.group.affinity.as_ref().map(|a| a.required.as_slice()),
            ),
        }
    }

    pub fn get_preferred_affinity(&self) -> Vec<UnitAffinityTerm> {
        match self {
            SchedulingUnit::Single(_) => Vec::new(),
            SchedulingUnit::Group(g) => filter_affinity_terms(
                g.group.affinity.as_ref().map(|a| a.preferred.as_slice()),
            ),
        }
    }

    /// Node label constraints from the group affinity. Single units
    /// express node constraints on the workload itself, so this stays
    /// `None` for them.
    pub fn get_affinity_node_selector(&self) -> Option<&NodeSelector> {
        match self {
            SchedulingUnit::Single(_) => None,
            SchedulingUnit::Group(g) => g
                .group
                .affinity
                .as_ref()
                .and_then(|a| a.node_selector.as_ref()),
        }
    }

    /// Sort rules from the group affinity. A rule without a dimension
    /// gets `Capacity` for backward compatibility; unknown dimensions
    /// flow through unchanged.
    pub fn get_sort_rules_for_affinity(&self) -> Vec<SortRule> {
        match self {
            SchedulingUnit::Single(_) => Vec::new(),
            SchedulingUnit::Group(g) => {
                let Some(affinity) = g.group.affinity.as_ref() else {
                    return Vec::new();
                };
                affinity
                    .sort_rules
                    .iter()
                    .map(|rule| {
                        let mut rule = rule.clone();
                        if rule.dimension.is_empty() {
                            rule.dimension = SORT_DIMENSION_CAPACITY.to_string();
                        }
                        rule
                    })
                    .collect()
            }
        }
    }

    pub fn is_debug_mode_on(&self) -> bool {
        match self {
            SchedulingUnit::Single(s) => {
                s.pod.as_ref().is_some_and(|p| p.pod.is_debug_mode_on())
            }
            SchedulingUnit::Group(g) => g
                .group
                .annotations
                .get(DEBUG_MODE_ANNOTATION_KEY)
                .is_some_and(|v| v == DEBUG_MODE_ON),
        }
    }

    pub fn get_creation_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SchedulingUnit::Single(s) => s.pod.as_ref().map(|p| p.pod.creation_timestamp),
            SchedulingUnit::Group(g) => Some(g.group.creation_timestamp),
        }
    }

    pub fn get_enqueued_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SchedulingUnit::Single(s) => s.pod.as_ref().map(|p| p.timestamp),
            SchedulingUnit::Group(g) => Some(g.timestamp),
        }
    }

    /// Stamp the unit's enqueue time. On a group this updates the unit
    /// timestamp and propagates to every member; on a single, only the
    /// workload itself.
    pub fn set_enqueued_timestamp(&mut self, ts: DateTime<Utc>) {
        match self {
            SchedulingUnit::Single(s) => {
                if let Some(pod) = s.pod.as_mut() {
                    pod.timestamp = ts;
                }
            }
            SchedulingUnit::Group(g) => {
                for pod in g.pods.values_mut() {
                    pod.timestamp = ts;
                }
                g.timestamp = ts;
            }
        }
    }

    pub fn group(&self) -> Option<&Arc<PodGroup>> {
        match self {
            SchedulingUnit::Single(_) => None,
            SchedulingUnit::Group(g) => Some(&g.group),
        }
    }

    /// Take ownership of the members, leaving the unit empty.
    pub fn take_pods(&mut self) -> Vec<QueuedPodInfo> {
        match self {
            SchedulingUnit::Single(s) => s.pod.take().into_iter().collect(),
            SchedulingUnit::Group(g) => g.pods.drain().map(|(_, p)| p).collect(),
        }
    }

    pub fn pods_mut(&mut self) -> Vec<&mut QueuedPodInfo> {
        match self {
            SchedulingUnit::Single(s) => s.pod.iter_mut().collect(),
            SchedulingUnit::Group(g) => g.pods.values_mut().collect(),
        }
    }
}

fn filter_affinity_terms(terms: Option<&[UnitAffinityTerm]>) -> Vec<UnitAffinityTerm> {
    terms
        .unwrap_or_default()
        .iter()
        .filter(|t| !t.topology_key.is_empty())
        .cloned()
        .collect()
}

impl fmt::Display for SchedulingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingUnit::Single(s) => match &s.pod {
                Some(pod) => write!(f, "{{pod: {}:{}}}", pod.uid(), pod.pod.full_name()),
                None => write!(f, "{{pod: empty}}"),
            },
            SchedulingUnit::Group(g) => {
                let mut members: Vec<&str> = g.pods.keys().map(|k| k.as_str()).collect();
                members.sort_unstable();
                let members = if members.is_empty() {
                    "empty".to_string()
                } else {
                    members.join(",")
                };
                write!(
                    f,
                    "{{pods: [{}], group: {}, priority: {}}}",
                    members,
                    g.group.full_name(),
                    g.priority
                )
            }
        }
    }
}
