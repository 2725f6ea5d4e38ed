//! Scheduler profile: which plugins run at which extension point.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use gangway_framework::plugin::PreFilterPlugin;
use gangway_plugins::{
    Fit, NodeLabel, NodeLabelArgs, NodeResourcesFitArgs, NodeResourcesLeastAllocated,
    NodeResourcesLeastAllocatedArgs, PluginError,
};

use crate::error::{SchedulerError, SchedulerResult};
use crate::registry::PluginRegistry;

/// One enabled plugin, with an optional score weight and JSON
/// arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct PluginConfig {
    pub name: String,
    /// Only meaningful for score plugins; defaults to 1.
    pub weight: Option<i64>,
    pub args: Option<serde_json::Value>,
}

impl PluginConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: None,
            args: None,
        }
    }
}

/// Enabled plugins per extension point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct PluginSet {
    pub filter: Vec<PluginConfig>,
    pub score: Vec<PluginConfig>,
}

/// A scheduling profile. Unknown fields anywhere in the document are
/// rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SchedulerProfile {
    pub name: String,
    #[serde(default)]
    pub plugins: PluginSet,
}

/// The profile used when none is supplied: resource fit filtering and
/// least-allocated scoring.
pub fn default_profile() -> SchedulerProfile {
    SchedulerProfile {
        name: "gangway-scheduler".to_string(),
        plugins: PluginSet {
            filter: vec![PluginConfig::named(Fit::NAME)],
            score: vec![PluginConfig::named(NodeResourcesLeastAllocated::NAME)],
        },
    }
}

fn parse_args<T>(plugin: &'static str, config: &PluginConfig) -> Result<T, PluginError>
where
    T: Default + serde::de::DeserializeOwned,
{
    match &config.args {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|source| PluginError::ParseArgs { plugin, source }),
        None => Ok(T::default()),
    }
}

/// Build a plugin registry from a profile. Filter plugins that also
/// implement PreFilter are wired to both points.
pub fn build_registry(profile: &SchedulerProfile) -> SchedulerResult<PluginRegistry> {
    let mut builder = PluginRegistry::builder();

    for config in &profile.plugins.filter {
        match config.name.as_str() {
            Fit::NAME => {
                let args: NodeResourcesFitArgs = parse_args(Fit::NAME, config)?;
                let plugin = Arc::new(Fit::new(&args)?);
                builder = builder
                    .with_pre_filter(Arc::clone(&plugin) as Arc<dyn PreFilterPlugin>)
                    .with_filter(plugin);
            }
            NodeLabel::NAME => {
                let args: NodeLabelArgs = parse_args(NodeLabel::NAME, config)?;
                builder = builder.with_filter(Arc::new(NodeLabel::new(&args)?));
            }
            other => return Err(SchedulerError::UnknownPlugin(other.to_string())),
        }
    }

    for config in &profile.plugins.score {
        let weight = config.weight.unwrap_or(1);
        if !(1..=100).contains(&weight) {
            return Err(SchedulerError::InvalidPluginWeight(config.name.clone()));
        }
        match config.name.as_str() {
            NodeResourcesLeastAllocated::NAME => {
                let args: NodeResourcesLeastAllocatedArgs =
                    parse_args(NodeResourcesLeastAllocated::NAME, config)?;
                builder =
                    builder.with_score(Arc::new(NodeResourcesLeastAllocated::new(&args)?), weight);
            }
            NodeLabel::NAME => {
                let args: NodeLabelArgs = parse_args(NodeLabel::NAME, config)?;
                builder = builder.with_score(Arc::new(NodeLabel::new(&args)?), weight);
            }
            other => return Err(SchedulerError::UnknownPlugin(other.to_string())),
        }
    }

    Ok(builder.build())
}
