//! The resource vector charged against node capacity.
//!
//! CPU is tracked in integer milli-units, memory and ephemeral storage
//! in bytes, and every other resource as an opaque named `i64` scalar.
//! All arithmetic saturates at zero; the hot path never touches floats.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of an extended (scalar) resource, e.g. `nvidia.com/gpu`.
pub type ResourceName = String;

/// Well-known resource names used in diagnostics.
pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";
pub const RESOURCE_EPHEMERAL_STORAGE: &str = "ephemeral-storage";
pub const RESOURCE_PODS: &str = "pods";

/// A fixed resource vector plus open-world scalar resources.
///
/// Scalar resources use open-world semantics: a missing key means zero
/// requested and zero available. The scalar map is a `BTreeMap` so that
/// iteration order is deterministic, which the fitness evaluator relies
/// on for reproducible first-failure diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub milli_cpu: i64,
    pub memory: i64,
    pub ephemeral_storage: i64,
    /// How many pods this vector admits (node side) or counts for
    /// (demand side, 0 or 1).
    pub allowed_pod_number: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scalar_resources: BTreeMap<ResourceName, i64>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Componentwise saturating addition.
    pub fn add(&mut self, other: &Resource) {
        self.milli_cpu = self.milli_cpu.saturating_add(other.milli_cpu.max(0));
        self.memory = self.memory.saturating_add(other.memory.max(0));
        self.ephemeral_storage = self
            .ephemeral_storage
            .saturating_add(other.ephemeral_storage.max(0));
        self.allowed_pod_number = self
            .allowed_pod_number
            .saturating_add(other.allowed_pod_number.max(0));
        for (name, quantity) in &other.scalar_resources {
            let entry = self.scalar_resources.entry(name.clone()).or_insert(0);
            *entry = entry.saturating_add((*quantity).max(0));
        }
    }

    /// Componentwise saturating subtraction, floored at zero.
    pub fn sub(&mut self, other: &Resource) {
        self.milli_cpu = (self.milli_cpu - other.milli_cpu).max(0);
        self.memory = (self.memory - other.memory).max(0);
        self.ephemeral_storage = (self.ephemeral_storage - other.ephemeral_storage).max(0);
        self.allowed_pod_number = (self.allowed_pod_number - other.allowed_pod_number).max(0);
        for (name, quantity) in &other.scalar_resources {
            let entry = self.scalar_resources.entry(name.clone()).or_insert(0);
            *entry = (*entry - *quantity).max(0);
        }
    }

    /// Componentwise maximum, in place.
    ///
    /// Used for init containers: they run sequentially and release
    /// their resources before regular containers start, so only the
    /// peak matters.
    pub fn set_max_resource(&mut self, other: &Resource) {
        self.milli_cpu = self.milli_cpu.max(other.milli_cpu);
        self.memory = self.memory.max(other.memory);
        self.ephemeral_storage = self.ephemeral_storage.max(other.ephemeral_storage);
        self.allowed_pod_number = self.allowed_pod_number.max(other.allowed_pod_number);
        for (name, quantity) in &other.scalar_resources {
            let entry = self.scalar_resources.entry(name.clone()).or_insert(0);
            *entry = (*entry).max(*quantity);
        }
    }

    /// Quantity of a scalar resource; missing keys read as zero.
    pub fn scalar(&self, name: &str) -> i64 {
        self.scalar_resources.get(name).copied().unwrap_or(0)
    }

    /// Set a scalar resource quantity, clamped at zero.
    pub fn set_scalar(&mut self, name: impl Into<ResourceName>, quantity: i64) {
        self.scalar_resources.insert(name.into(), quantity.max(0));
    }
}
