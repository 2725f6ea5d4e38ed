//! Argument validation shared by plugin constructors.

use crate::args::{
    LoadAwareArgs, NodeLabelArgs, NodeResourcesFitArgs, RequestedToCapacityRatioArgs,
    ResourceSpec, UtilizationShapePoint,
};
use crate::error::{PluginError, PluginResult};

const QUALIFIED_NAME_MAX_LENGTH: usize = 63;

/// Validate a qualified resource name (`[prefix/]name`), returning
/// every violation found.
///
/// The name part must be 1–63 characters of alphanumerics, `-`, `_`
/// or `.`, starting and ending alphanumeric. An optional prefix before
/// a single `/` must be a non-empty DNS subdomain.
pub fn qualified_name_errors(value: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let parts: Vec<&str> = value.split('/').collect();
    let name = match parts.len() {
        1 => parts[0],
        2 => {
            if parts[0].is_empty() {
                errors.push("prefix part must be non-empty".to_string());
            }
            parts[1]
        }
        _ => {
            errors.push(
                "a qualified name must consist of alphanumeric characters, '-', '_' or '.', \
                 with an optional DNS subdomain prefix and '/'"
                    .to_string(),
            );
            parts[parts.len() - 1]
        }
    };

    if name.is_empty() {
        errors.push("name part must be non-empty".to_string());
    } else {
        if name.len() > QUALIFIED_NAME_MAX_LENGTH {
            errors.push(format!(
                "name part must be no more than {QUALIFIED_NAME_MAX_LENGTH} characters"
            ));
        }
        let valid_inner = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        let valid_edges = name.starts_with(|c: char| c.is_ascii_alphanumeric())
            && name.ends_with(|c: char| c.is_ascii_alphanumeric());
        if !valid_inner || !valid_edges {
            errors.push(
                "name part must consist of alphanumeric characters, '-', '_' or '.', and must \
                 start and end with an alphanumeric character"
                    .to_string(),
            );
        }
    }
    errors
}

/// Validate NodeResourcesFit arguments.
pub fn validate_fit_args(args: &NodeResourcesFitArgs) -> PluginResult<()> {
    for name in &args.ignored_resources {
        let errors = qualified_name_errors(name);
        if !errors.is_empty() {
            return Err(PluginError::InvalidArgs {
                plugin: "NodeResourcesFit",
                reason: format!("invalid ignored resource {name:?}: {}", errors.join("; ")),
            });
        }
    }
    for group in &args.ignored_resource_groups {
        if group.contains('/') {
            return Err(PluginError::InvalidArgs {
                plugin: "NodeResourcesFit",
                reason: format!("resource group name can't contain '/': {group:?}"),
            });
        }
        let errors = qualified_name_errors(group);
        if !errors.is_empty() {
            return Err(PluginError::InvalidArgs {
                plugin: "NodeResourcesFit",
                reason: format!(
                    "invalid ignored resource group {group:?}: {}",
                    errors.join("; ")
                ),
            });
        }
    }
    Ok(())
}

/// Validate scoring resource specs: weights must lie in [1, 100].
pub fn validate_resource_specs(plugin: &'static str, specs: &[ResourceSpec]) -> PluginResult<()> {
    for spec in specs {
        if !(1..=100).contains(&spec.weight) {
            return Err(PluginError::InvalidArgs {
                plugin,
                reason: format!(
                    "weight of resource {} should be in range [1, 100]",
                    spec.name
                ),
            });
        }
    }
    Ok(())
}

/// Validate a priority function shape: utilization in [0, 100] and
/// strictly increasing, score in [0, 10].
pub fn validate_shape(plugin: &'static str, shape: &[UtilizationShapePoint]) -> PluginResult<()> {
    if shape.is_empty() {
        return Err(PluginError::InvalidArgs {
            plugin,
            reason: "shape must have at least one point".to_string(),
        });
    }
    let mut previous: Option<i32> = None;
    for point in shape {
        if !(0..=100).contains(&point.utilization) {
            return Err(PluginError::InvalidArgs {
                plugin,
                reason: format!("utilization {} must be in range [0, 100]", point.utilization),
            });
        }
        if !(0..=10).contains(&point.score) {
            return Err(PluginError::InvalidArgs {
                plugin,
                reason: format!("score {} must be in range [0, 10]", point.score),
            });
        }
        if previous.is_some_and(|p| p >= point.utilization) {
            return Err(PluginError::InvalidArgs {
                plugin,
                reason: "utilization values must be sorted in increasing order".to_string(),
            });
        }
        previous = Some(point.utilization);
    }
    Ok(())
}

/// Validate RequestedToCapacityRatio arguments.
pub fn validate_requested_to_capacity_ratio_args(
    args: &RequestedToCapacityRatioArgs,
) -> PluginResult<()> {
    validate_shape("RequestedToCapacityRatio", &args.shape)?;
    validate_resource_specs("RequestedToCapacityRatio", &args.resources)
}

/// Validate NodeLabel arguments: a label may not appear in both the
/// present and absent list of the same kind.
pub fn validate_node_label_args(args: &NodeLabelArgs) -> PluginResult<()> {
    for label in &args.present_labels {
        if args.absent_labels.contains(label) {
            return Err(PluginError::InvalidArgs {
                plugin: "NodeLabel",
                reason: format!("label {label} is specified in both present and absent lists"),
            });
        }
    }
    for label in &args.present_labels_preference {
        if args.absent_labels_preference.contains(label) {
            return Err(PluginError::InvalidArgs {
                plugin: "NodeLabel",
                reason: format!(
                    "label {label} is specified in both present and absent preference lists"
                ),
            });
        }
    }
    Ok(())
}

/// Validate LoadAware arguments.
pub fn validate_load_aware_args(args: &LoadAwareArgs) -> PluginResult<()> {
    validate_resource_specs("LoadAware", &args.resources)?;
    if args.filter_expired_node_metrics && args.node_metric_expiration_seconds <= 0 {
        return Err(PluginError::InvalidArgs {
            plugin: "LoadAware",
            reason: "nodeMetricExpirationSeconds must be positive when \
                     filterExpiredNodeMetrics is set"
                .to_string(),
        });
    }
    for (name, threshold) in &args.usage_thresholds {
        if !(0..=100).contains(threshold) {
            return Err(PluginError::InvalidArgs {
                plugin: "LoadAware",
                reason: format!("usage threshold of resource {name} should be in range [0, 100]"),
            });
        }
    }
    for (name, factor) in &args.estimated_scaling_factors {
        if !(1..=100).contains(factor) {
            return Err(PluginError::InvalidArgs {
                plugin: "LoadAware",
                reason: format!(
                    "estimated scaling factor of resource {name} should be in range [1, 100]"
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit_args(
        ignored_resources: &[&str],
        ignored_resource_groups: &[&str],
    ) -> NodeResourcesFitArgs {
        NodeResourcesFitArgs {
            ignored_resources: ignored_resources.iter().map(|s| s.to_string()).collect(),
            ignored_resource_groups: ignored_resource_groups
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    fn reason(err: PluginError) -> String {
        err.to_string()
    }

    #[test]
    fn ignored_resource_name_too_long() {
        let long = format!("longvalue{}", "a".repeat(64));
        let err = validate_fit_args(&fit_args(&[&long], &[])).unwrap_err();
        assert!(reason(err).contains("name part must be no more than 63 characters"));
    }

    #[test]
    fn ignored_resource_empty_name_part() {
        let err = validate_fit_args(&fit_args(&["example.com/"], &[])).unwrap_err();
        assert!(reason(err).contains("name part must be non-empty"));
    }

    #[test]
    fn ignored_resource_too_many_slashes() {
        let err = validate_fit_args(&fit_args(&["example.com/aaa/bbb"], &[])).unwrap_err();
        assert!(reason(err).contains("a qualified name must consist of alphanumeric characters"));
    }

    #[test]
    fn valid_fit_args_pass() {
        assert!(validate_fit_args(&fit_args(&["example.com"], &[])).is_ok());
        assert!(validate_fit_args(&fit_args(&["example.com/aaa"], &["example.com"])).is_ok());
    }

    #[test]
    fn resource_group_cannot_contain_slash() {
        let err = validate_fit_args(&fit_args(&[], &["example.com/aa"])).unwrap_err();
        assert!(reason(err).contains("resource group name can't contain '/'"));
    }

    #[test]
    fn resource_group_length_checked() {
        let err = validate_fit_args(&fit_args(&[], &[&"a".repeat(64)])).unwrap_err();
        assert!(reason(err).contains("name part must be no more than 63 characters"));
    }

    #[test]
    fn resource_group_empty_rejected() {
        let err = validate_fit_args(&fit_args(&[], &[""])).unwrap_err();
        assert!(reason(err).contains("name part must be non-empty"));
    }

    #[test]
    fn weight_range_enforced() {
        let specs = vec![ResourceSpec::new("cpu", 0)];
        let err = validate_resource_specs("NodeResourcesLeastAllocated", &specs).unwrap_err();
        assert!(reason(err).contains("should be in range [1, 100]"));

        let specs = vec![ResourceSpec::new("cpu", 101)];
        assert!(validate_resource_specs("NodeResourcesLeastAllocated", &specs).is_err());

        let specs = vec![ResourceSpec::new("cpu", 100), ResourceSpec::new("memory", 1)];
        assert!(validate_resource_specs("NodeResourcesLeastAllocated", &specs).is_ok());
    }

    #[test]
    fn shape_ranges_and_ordering_enforced() {
        let shape = vec![
            UtilizationShapePoint {
                utilization: 0,
                score: 0,
            },
            UtilizationShapePoint {
                utilization: 100,
                score: 10,
            },
        ];
        assert!(validate_shape("RequestedToCapacityRatio", &shape).is_ok());

        let unsorted = vec![
            UtilizationShapePoint {
                utilization: 50,
                score: 5,
            },
            UtilizationShapePoint {
                utilization: 50,
                score: 6,
            },
        ];
        let err = validate_shape("RequestedToCapacityRatio", &unsorted).unwrap_err();
        assert!(reason(err).contains("sorted in increasing order"));

        let out_of_range = vec![UtilizationShapePoint {
            utilization: 101,
            score: 0,
        }];
        assert!(validate_shape("RequestedToCapacityRatio", &out_of_range).is_err());

        let bad_score = vec![UtilizationShapePoint {
            utilization: 10,
            score: 11,
        }];
        assert!(validate_shape("RequestedToCapacityRatio", &bad_score).is_err());

        assert!(validate_shape("RequestedToCapacityRatio", &[]).is_err());
    }

    #[test]
    fn node_label_consistency_enforced() {
        let args = NodeLabelArgs {
            present_labels: vec!["zone".to_string()],
            absent_labels: vec!["zone".to_string()],
            ..Default::default()
        };
        let err = validate_node_label_args(&args).unwrap_err();
        assert!(reason(err).contains("both present and absent"));
    }

    #[test]
    fn load_aware_factor_range_enforced() {
        let mut args = LoadAwareArgs::default();
        args.estimated_scaling_factors.insert("cpu".to_string(), 0);
        assert!(validate_load_aware_args(&args).is_err());

        let mut args = LoadAwareArgs::default();
        args.estimated_scaling_factors.insert("cpu".to_string(), 80);
        args.usage_thresholds.insert("memory".to_string(), 101);
        assert!(validate_load_aware_args(&args).is_err());

        let mut args = LoadAwareArgs::default();
        args.filter_expired_node_metrics = true;
        args.node_metric_expiration_seconds = 0;
        assert!(validate_load_aware_args(&args).is_err());
    }
}
