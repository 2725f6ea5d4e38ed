//! Ordered plugin lists per extension point.

use std::sync::Arc;

use gangway_framework::plugin::{
    BindPlugin, FilterPlugin, PermitPlugin, PostBindPlugin, PostFilterPlugin, PreBindPlugin,
    PreFilterPlugin, PreScorePlugin, ReservePlugin, ScorePlugin,
};

/// A score plugin and the weight applied to its node scores.
#[derive(Clone)]
pub struct ScoreEntry {
    pub plugin: Arc<dyn ScorePlugin>,
    pub weight: i64,
}

/// The plugins enabled at each extension point, in dispatch order.
///
/// Built once at startup; dispatch is a plain loop over each list.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    pub(crate) pre_filter: Vec<Arc<dyn PreFilterPlugin>>,
    pub(crate) filter: Vec<Arc<dyn FilterPlugin>>,
    pub(crate) post_filter: Vec<Arc<dyn PostFilterPlugin>>,
    pub(crate) pre_score: Vec<Arc<dyn PreScorePlugin>>,
    pub(crate) score: Vec<ScoreEntry>,
    pub(crate) reserve: Vec<Arc<dyn ReservePlugin>>,
    pub(crate) permit: Vec<Arc<dyn PermitPlugin>>,
    pub(crate) pre_bind: Vec<Arc<dyn PreBindPlugin>>,
    pub(crate) bind: Vec<Arc<dyn BindPlugin>>,
    pub(crate) post_bind: Vec<Arc<dyn PostBindPlugin>>,
}

impl PluginRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            registry: PluginRegistry::default(),
        }
    }

    pub fn num_filter_plugins(&self) -> usize {
        self.filter.len()
    }

    pub fn num_score_plugins(&self) -> usize {
        self.score.len()
    }
}

/// Builder wiring plugins to extension points at startup.
pub struct RegistryBuilder {
    registry: PluginRegistry,
}

impl RegistryBuilder {
    pub fn with_pre_filter(mut self, plugin: Arc<dyn PreFilterPlugin>) -> Self {
        self.registry.pre_filter.push(plugin);
        self
    }

    pub fn with_filter(mut self, plugin: Arc<dyn FilterPlugin>) -> Self {
        self.registry.filter.push(plugin);
        self
    }

    pub fn with_post_filter(mut self, plugin: Arc<dyn PostFilterPlugin>) -> Self {
        self.registry.post_filter.push(plugin);
        self
    }

    pub fn with_pre_score(mut self, plugin: Arc<dyn PreScorePlugin>) -> Self {
        self.registry.pre_score.push(plugin);
        self
    }

    pub fn with_score(mut self, plugin: Arc<dyn ScorePlugin>, weight: i64) -> Self {
        self.registry.score.push(ScoreEntry { plugin, weight });
        self
    }

    pub fn with_reserve(mut self, plugin: Arc<dyn ReservePlugin>) -> Self {
        self.registry.reserve.push(plugin);
        self
    }

    pub fn with_permit(mut self, plugin: Arc<dyn PermitPlugin>) -> Self {
        self.registry.permit.push(plugin);
        self
    }

    pub fn with_pre_bind(mut self, plugin: Arc<dyn PreBindPlugin>) -> Self {
        self.registry.pre_bind.push(plugin);
        self
    }

    pub fn with_bind(mut self, plugin: Arc<dyn BindPlugin>) -> Self {
        self.registry.bind.push(plugin);
        self
    }

    pub fn with_post_bind(mut self, plugin: Arc<dyn PostBindPlugin>) -> Self {
        self.registry.post_bind.push(plugin);
        self
    }

    pub fn build(self) -> PluginRegistry {
        self.registry
    }
}
