//! The per-attempt scratchpad shared across pipeline stages.
//!
//! Entries are opaque payloads keyed by string. Payloads declare how
//! they clone instead of relying on runtime reflection, so the state
//! can be duplicated for node-parallel stages without knowing the
//! concrete types inside.

use std::any::Any;
use std::collections::HashMap;

use crate::error::{FrameworkError, FrameworkResult};

/// A payload stored in [`CycleState`].
pub trait StateData: Any + Send + Sync {
    /// Explicit clone; called when a stage duplicates the state.
    fn clone_data(&self) -> Box<dyn StateData>;

    fn as_any(&self) -> &dyn Any;
}

/// Per-attempt typed key/value workspace. Starts empty on every
/// placement attempt; writes are never visible across units.
#[derive(Default)]
pub struct CycleState {
    storage: HashMap<String, Box<dyn StateData>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, key: impl Into<String>, data: Box<dyn StateData>) {
        self.storage.insert(key.into(), data);
    }

    /// Read a raw entry. Missing keys are a structured error, not a
    /// silent default.
    pub fn read(&self, key: &str) -> FrameworkResult<&dyn StateData> {
        self.storage
            .get(key)
            .map(|b| b.as_ref())
            .ok_or_else(|| FrameworkError::StateKeyNotFound {
                key: key.to_string(),
            })
    }

    /// Read an entry downcast to its concrete type.
    pub fn read_as<T: StateData>(&self, key: &str) -> FrameworkResult<&T> {
        let data = self.read(key)?;
        data.as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| FrameworkError::StateTypeMismatch {
                key: key.to_string(),
            })
    }

    pub fn delete(&mut self, key: &str) {
        self.storage.remove(key);
    }

    /// Duplicate the state via each payload's clone contract.
    pub fn clone_state(&self) -> CycleState {
        let storage = self
            .storage
            .iter()
            .map(|(k, v)| (k.clone(), v.clone_data()))
            .collect();
        CycleState { storage }
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}
