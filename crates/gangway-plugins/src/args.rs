//! Typed configuration per plugin.
//!
//! Each struct is the JSON schema of one plugin's arguments. Unknown
//! fields are rejected at parse time; range and consistency checks run
//! in [`crate::validation`] when the plugin is constructed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use gangway_framework::pod::PodResourceType;
use gangway_framework::resource::ResourceName;

/// A resource considered by a scoring plugin, with its weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceSpec {
    pub name: String,
    /// Allowed weights go from 1 to 100.
    #[serde(default = "default_weight")]
    pub weight: i64,
    /// Restricts the spec to one resource accounting class; `None`
    /// applies to all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<PodResourceType>,
}

fn default_weight() -> i64 {
    1
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, weight: i64) -> Self {
        Self {
            name: name.into(),
            weight,
            resource_type: None,
        }
    }
}

/// A single point of a priority function shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UtilizationShapePoint {
    /// Utilization (x axis), 0 to 100. A fully utilized node maps to 100.
    pub utilization: i32,
    /// Score assigned to the utilization (y axis), 0 to 10.
    pub score: i32,
}

/// Arguments for the NodeResourcesFit plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct NodeResourcesFitArgs {
    /// Resource names the fitness evaluator skips entirely.
    pub ignored_resources: Vec<String>,
    /// Resource group prefixes to skip, e.g. `example.com` skips
    /// `example.com/aaa` and `example.com/bbb`. A group name can't
    /// contain `/`.
    pub ignored_resource_groups: Vec<String>,
}

/// Arguments for the InterPodAffinity plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct InterPodAffinityArgs {
    /// Scoring weight for existing pods with a matching hard affinity
    /// to the incoming pod.
    pub hard_pod_affinity_weight: i32,
}

impl Default for InterPodAffinityArgs {
    fn default() -> Self {
        Self {
            hard_pod_affinity_weight: 1,
        }
    }
}

/// Arguments for the NodeLabel plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct NodeLabelArgs {
    /// Labels that must be present for a node to fit.
    pub present_labels: Vec<String>,
    /// Labels that must be absent for a node to fit.
    pub absent_labels: Vec<String>,
    /// Nodes carrying these labels score higher.
    pub present_labels_preference: Vec<String>,
    /// Nodes missing these labels score higher.
    pub absent_labels_preference: Vec<String>,
}

/// Arguments for the NodeResourcesLeastAllocated plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct NodeResourcesLeastAllocatedArgs {
    /// Resources considered when scoring; defaults to cpu and memory
    /// with equal weight.
    pub resources: Vec<ResourceSpec>,
}

/// Arguments for the NodeResourcesMostAllocated plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct NodeResourcesMostAllocatedArgs {
    pub resources: Vec<ResourceSpec>,
}

/// Arguments for the NodeResourcesBalancedAllocation plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct NodeResourcesBalancedAllocationArgs {
    pub resources: Vec<ResourceSpec>,
}

/// A topology spread constraint applied by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TopologySpreadConstraint {
    pub max_skew: i32,
    pub topology_key: String,
    /// `DoNotSchedule` or `ScheduleAnyway`.
    pub when_unsatisfiable: String,
}

/// Arguments for the PodTopologySpread plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct PodTopologySpreadArgs {
    /// Constraints applied only to workloads that declare none of
    /// their own.
    pub default_constraints: Vec<TopologySpreadConstraint>,
}

/// Arguments for the RequestedToCapacityRatio plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RequestedToCapacityRatioArgs {
    /// Points defining the priority function shape.
    pub shape: Vec<UtilizationShapePoint>,
    pub resources: Vec<ResourceSpec>,
}

/// Arguments for the LoadAware plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LoadAwareArgs {
    pub resources: Vec<ResourceSpec>,
    /// Which usage estimator to use.
    pub estimator: String,
    pub filter_expired_node_metrics: bool,
    pub node_metric_expiration_seconds: i64,
    /// Per-resource usage ceiling in percent.
    pub usage_thresholds: HashMap<ResourceName, i64>,
    /// Per-resource estimation factor in percent: a CPU factor of 80
    /// estimates usage as 80/100 × request.cpu.
    pub estimated_scaling_factors: HashMap<ResourceName, i64>,
}

/// Arguments for the StartRecently plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct StartRecentlyArgs {
    /// A pod may only be preempted once it has run at least this long.
    pub preempt_min_interval_seconds: Option<i64>,
}

/// Score policy for storage pool scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScorePolicy {
    MostAvailable,
    LeastAvailable,
}

impl Default for ScorePolicy {
    fn default() -> Self {
        ScorePolicy::MostAvailable
    }
}

/// Arguments for the LocalStoragePoolChecker plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LocalStoragePoolCheckerArgs {
    #[serde(rename = "score_policy")]
    pub score_policy: ScorePolicy,
    #[serde(rename = "storage_class_weights")]
    pub storage_class_weights: Vec<ResourceSpec>,
}

/// Arguments for the ServiceAffinity plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ServiceAffinityArgs {
    /// Labels that must be homogeneous for pods of one service.
    pub affinity_labels: Vec<String>,
    /// Labels considered for service anti-affinity scoring.
    pub anti_affinity_labels_preference: Vec<String>,
}

/// Arguments for the VolumeBinding plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct VolumeBindingArgs {
    /// Timeout of the volume binding operation in seconds; zero means
    /// no waiting.
    pub bind_timeout_seconds: i64,
}

/// Arguments for the NodeLoad plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct NodeLoadArgs {
    /// Threshold for node load limitation.
    pub load_threshold: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_args_parse_from_json() {
        let args: NodeResourcesFitArgs = serde_json::from_str(
            r#"{"ignoredResources": ["example.com/aaa"], "ignoredResourceGroups": ["example.com"]}"#,
        )
        .unwrap();
        assert_eq!(args.ignored_resources, ["example.com/aaa"]);
        assert_eq!(args.ignored_resource_groups, ["example.com"]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<NodeResourcesFitArgs, _> =
            serde_json::from_str(r#"{"ignoredResources": [], "bogus": 1}"#);
        assert!(result.is_err());

        let result: Result<LoadAwareArgs, _> =
            serde_json::from_str(r#"{"estimator": "default", "extra": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_fields_default() {
        let args: NodeResourcesFitArgs = serde_json::from_str("{}").unwrap();
        assert!(args.ignored_resources.is_empty());

        let args: InterPodAffinityArgs = serde_json::from_str("{}").unwrap();
        assert_eq!(args.hard_pod_affinity_weight, 1);
    }

    #[test]
    fn resource_spec_weight_defaults_to_one() {
        let spec: ResourceSpec = serde_json::from_str(r#"{"name": "cpu"}"#).unwrap();
        assert_eq!(spec.weight, 1);
    }

    #[test]
    fn storage_pool_args_use_snake_keys() {
        let args: LocalStoragePoolCheckerArgs = serde_json::from_str(
            r#"{"score_policy": "LeastAvailable", "storage_class_weights": [{"name": "ssd", "weight": 10}]}"#,
        )
        .unwrap();
        assert_eq!(args.score_policy, ScorePolicy::LeastAvailable);
        assert_eq!(args.storage_class_weights[0].weight, 10);
    }

    #[test]
    fn load_aware_args_parse_maps() {
        let args: LoadAwareArgs = serde_json::from_str(
            r#"{
                "estimator": "default",
                "filterExpiredNodeMetrics": true,
                "nodeMetricExpirationSeconds": 180,
                "usageThresholds": {"cpu": 65},
                "estimatedScalingFactors": {"cpu": 80, "memory": 70}
            }"#,
        )
        .unwrap();
        assert!(args.filter_expired_node_metrics);
        assert_eq!(args.usage_thresholds["cpu"], 65);
        assert_eq!(args.estimated_scaling_factors["memory"], 70);
    }
}
