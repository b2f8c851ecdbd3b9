use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::input::{Input, Inputs, OutputRef, Outputs};

/// The kind of infrastructure object a node declares.
///
/// Each kind is served by exactly one registered provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Bucket,
    BucketPolicy,
    BucketObject,
    OriginAccessIdentity,
    Distribution,
    SwagRequest,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bucket => "bucket",
            Self::BucketPolicy => "bucket_policy",
            Self::BucketObject => "bucket_object",
            Self::OriginAccessIdentity => "origin_access_identity",
            Self::Distribution => "distribution",
            Self::SwagRequest => "swag_request",
        }
    }

    /// Kinds that can only ever be created. Removing one forgets its record without a
    /// provider call, so no provider needs to be registered for it at that point.
    pub fn is_create_only(&self) -> bool {
        matches!(self, Self::SwagRequest)
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bucket" => Some(Self::Bucket),
            "bucket_policy" => Some(Self::BucketPolicy),
            "bucket_object" => Some(Self::BucketObject),
            "origin_access_identity" => Some(Self::OriginAccessIdentity),
            "distribution" => Some(Self::Distribution),
            "swag_request" => Some(Self::SwagRequest),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared resource: logical name, kind and input attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub name: String,
    pub kind: ResourceKind,
    pub inputs: Inputs,
}

impl ResourceNode {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs: Inputs::new(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, input: Input) -> Self {
        self.inputs.insert(key.into(), input);
        self
    }

    pub fn with_inputs(mut self, inputs: Inputs) -> Self {
        self.inputs.extend(inputs);
        self
    }

    /// Reference one of this node's outputs.
    pub fn output(&self, field: &str) -> OutputRef {
        OutputRef::new(self.name.clone(), field)
    }

    /// Every output reference made by this node's inputs.
    pub fn references(&self) -> Vec<&OutputRef> {
        self.inputs.values().flat_map(|i| i.references()).collect()
    }

    /// Names of the producer nodes this node depends on.
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.references().into_iter().map(|r| r.node.clone()).collect()
    }
}

/// The recorded result of applying one node.
///
/// `inputs` holds the fully resolved input object the provider last accepted, so that
/// the next apply can detect changes without calling the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub name: String,
    pub kind: ResourceKind,
    /// Identifier assigned by the provider.
    pub id: String,
    pub inputs: Value,
    pub outputs: Outputs,
    /// Producer nodes this resource depended on when it was last applied.
    pub dependencies: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
