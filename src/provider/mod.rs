//! Resource providers.
//!
//! A provider performs the real side effect behind a node: a cloud API call or a
//! webhook. Every provider exposes the same four lifecycle operations. Operations a
//! provider does not implement fall back to the trait defaults, which return
//! [`ProviderError::Unsupported`] so the engine can report exactly what was refused.

mod simulated;
mod webhook;

pub use simulated::*;
pub use webhook::*;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Outputs, ResourceKind, ResourceState};

/// A lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{kind} provider does not support {operation}")]
    Unsupported {
        kind: ResourceKind,
        operation: Operation,
    },

    /// The provider refused or failed this one resource. Independent resources may
    /// still be applied.
    #[error("{0}")]
    Rejected(String),

    /// The whole apply must stop.
    #[error("{0}")]
    Fatal(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    pub fn unsupported(kind: ResourceKind, operation: Operation) -> Self {
        Self::Unsupported { kind, operation }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::Http(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateResult {
    pub id: String,
    pub outputs: Outputs,
}

/// The lifecycle contract every provider satisfies.
///
/// `inputs` is always the fully resolved JSON object of the node.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn create(
        &self,
        _name: &str,
        kind: ResourceKind,
        _inputs: &Value,
    ) -> Result<CreateResult, ProviderError> {
        Err(ProviderError::unsupported(kind, Operation::Create))
    }

    /// Current outputs of a recorded resource, or `None` if it no longer exists.
    async fn read(&self, current: &ResourceState) -> Result<Option<Outputs>, ProviderError> {
        Err(ProviderError::unsupported(current.kind, Operation::Read))
    }

    async fn update(
        &self,
        current: &ResourceState,
        _inputs: &Value,
    ) -> Result<Outputs, ProviderError> {
        Err(ProviderError::unsupported(current.kind, Operation::Update))
    }

    async fn delete(&self, current: &ResourceState) -> Result<(), ProviderError> {
        Err(ProviderError::unsupported(current.kind, Operation::Delete))
    }
}

/// Cloud resource kinds served by a single cloud provider.
pub const CLOUD_KINDS: [ResourceKind; 5] = [
    ResourceKind::Bucket,
    ResourceKind::BucketPolicy,
    ResourceKind::BucketObject,
    ResourceKind::OriginAccessIdentity,
    ResourceKind::Distribution,
];

/// Providers keyed by the kind they serve.
#[derive(Clone, Default)]
pub struct Providers {
    by_kind: HashMap<ResourceKind, Arc<dyn ResourceProvider>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: ResourceKind, provider: Arc<dyn ResourceProvider>) -> Self {
        self.by_kind.insert(kind, provider);
        self
    }

    /// Register one provider for every cloud kind.
    pub fn with_cloud(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        for kind in CLOUD_KINDS {
            self.by_kind.insert(kind, provider.clone());
        }
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&Arc<dyn ResourceProvider>> {
        self.by_kind.get(&kind)
    }
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.by_kind.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("Providers").field("kinds", &kinds).finish()
    }
}
