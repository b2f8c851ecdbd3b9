use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::resource::ResourceState;

/// Everything recorded for one stack between runs.
///
/// Created on first apply, mutated by each later apply, and trimmed as resources stop
/// being declared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackState {
    pub name: String,
    /// Recorded resources keyed by logical name.
    pub resources: BTreeMap<String, ResourceState>,
    /// Named export values.
    pub exports: BTreeMap<String, Value>,
}

impl StackState {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResourceState> {
        self.resources.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
