//! The orchestrator.
//!
//! The engine reconciles a [`StackDeclaration`](crate::stack::StackDeclaration) against the recorded [`StackState`]:
//!
//! - [`Engine::preview`] reports what an apply would do without calling providers.
//! - [`Engine::apply`] walks the dependency graph producers-first, creating, updating or
//!   replacing nodes whose resolved inputs changed, then deletes resources that are no
//!   longer declared. Each successful step is recorded immediately, so a failed apply
//!   leaves a durable partial state.
//! - [`Engine::refresh`] re-reads recorded resources from their providers.
//! - [`Engine::destroy`] deletes every recorded resource, consumers first.
//!
//! A provider failure blocks only the nodes that depend on the failed one. A fatal
//! provider error (see [`ProviderError::is_fatal`]) stops the run on the spot.

mod apply;
mod plan;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::db::Database;
use crate::graph::GraphError;
use crate::models::*;
use crate::provider::{ProviderError, Providers, ResourceProvider};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("No provider registered for resource kind '{0}'")]
    NoProvider(ResourceKind),

    #[error("Resource '{consumer}' references '{reference}', which its producer does not expose")]
    MissingOutput {
        consumer: String,
        reference: OutputRef,
    },

    #[error("Apply aborted at '{resource}': {source}")]
    Aborted {
        resource: String,
        #[source]
        source: ProviderError,
    },

    #[error("State store error: {0}")]
    State(#[from] anyhow::Error),
}

/// What a step does to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOp {
    Create,
    Update,
    /// Recorded kind differs from the declared kind: delete, then create.
    Replace,
    Delete,
    Same,
}

impl StepOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Same => "same",
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Same)
    }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Applied,
    Unchanged,
    Failed { reason: String },
    /// Not attempted because a resource it depends on failed.
    Skipped { blocked_by: String },
    /// Record dropped without a provider call; the kind cannot be deleted.
    Forgotten,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub name: String,
    pub kind: ResourceKind,
    pub op: StepOp,
}

/// Result of a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub stack: String,
    pub steps: Vec<PlannedStep>,
}

impl Plan {
    pub fn changes(&self) -> usize {
        self.steps.iter().filter(|s| s.op.is_change()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub kind: ResourceKind,
    pub op: StepOp,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Result of an apply or destroy.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub run_id: Uuid,
    pub stack: String,
    pub steps: Vec<StepOutcome>,
    pub exports: BTreeMap<String, Value>,
}

impl ApplyReport {
    /// True when no step failed or was skipped.
    pub fn is_success(&self) -> bool {
        self.steps
            .iter()
            .all(|s| {
                matches!(
                    s.status,
                    StepStatus::Applied | StepStatus::Unchanged | StepStatus::Forgotten
                )
            })
    }

    pub fn failed(&self) -> Vec<&StepOutcome> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed { .. }))
            .collect()
    }

    pub fn skipped(&self) -> Vec<&StepOutcome> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Skipped { .. }))
            .collect()
    }

    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// What a refresh did to one recorded resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum RefreshChange {
    Unchanged,
    Updated,
    /// The provider reports the resource gone; its record was dropped.
    Removed,
    /// The provider cannot read this kind; the record was kept as is.
    Kept,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub name: String,
    pub kind: ResourceKind,
    #[serde(flatten)]
    pub change: RefreshChange,
}

/// Reconciles declarations against recorded state through registered providers.
#[derive(Clone)]
pub struct Engine {
    db: Database,
    providers: Providers,
}

impl Engine {
    pub fn new(db: Database, providers: Providers) -> Self {
        Self { db, providers }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn provider(&self, kind: ResourceKind) -> Result<&Arc<dyn ResourceProvider>, ApplyError> {
        self.providers.get(kind).ok_or(ApplyError::NoProvider(kind))
    }

    /// Fail before any call if some kind has no provider.
    fn check_providers(&self, kinds: impl IntoIterator<Item = ResourceKind>) -> Result<(), ApplyError> {
        for kind in kinds {
            self.provider(kind)?;
        }
        Ok(())
    }
}

/// Compare declared inputs with the recorded resource.
fn step_op(recorded: Option<&ResourceState>, kind: ResourceKind, inputs: Option<&Value>) -> StepOp {
    match (recorded, inputs) {
        (None, _) => StepOp::Create,
        (Some(r), _) if r.kind != kind => StepOp::Replace,
        (Some(r), Some(inputs)) if r.inputs == *inputs => StepOp::Same,
        (Some(_), _) => StepOp::Update,
    }
}

/// Look up outputs of nodes already settled in this run. Nodes not yet settled are pending.
fn lookup_in(settled: &HashMap<String, Outputs>) -> impl Fn(&OutputRef) -> Lookup + '_ {
    move |r: &OutputRef| match settled.get(&r.node) {
        Some(outputs) => outputs
            .get(&r.field)
            .cloned()
            .map(Lookup::Found)
            .unwrap_or(Lookup::Missing),
        None => Lookup::Pending,
    }
}
