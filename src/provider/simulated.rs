//! In-process stand-in for the cloud provider.
//!
//! Identifiers and computed outputs are derived deterministically from the resource
//! name, so repeated runs against the same state store agree with each other. Every
//! call is recorded, and individual kinds can be made to fail.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{CreateResult, Operation, ProviderError, ResourceProvider};
use crate::models::{Outputs, ResourceKind, ResourceState};

const DEFAULT_REGION: &str = "us-east-1";

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCall {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub name: String,
    pub inputs: Option<Value>,
}

#[derive(Debug)]
pub struct SimulatedCloud {
    region: String,
    calls: Mutex<Vec<ProviderCall>>,
    failing: Mutex<HashSet<ResourceKind>>,
}

impl Default for SimulatedCloud {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}

impl SimulatedCloud {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every create and update of `kind` fail.
    pub fn fail_on(&self, kind: ResourceKind) {
        self.failing.lock().expect("failure set lock poisoned").insert(kind);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().expect("call log lock poisoned").clone()
    }

    /// Calls that would have changed real infrastructure.
    pub fn mutating_calls(&self) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation.is_mutating())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("call log lock poisoned").clear();
    }

    fn record(&self, operation: Operation, kind: ResourceKind, name: &str, inputs: Option<&Value>) {
        self.calls
            .lock()
            .expect("call log lock poisoned")
            .push(ProviderCall {
                operation,
                kind,
                name: name.to_string(),
                inputs: inputs.cloned(),
            });
    }

    fn check_failure(&self, kind: ResourceKind, operation: Operation, name: &str) -> Result<(), ProviderError> {
        if self
            .failing
            .lock()
            .expect("failure set lock poisoned")
            .contains(&kind)
        {
            return Err(ProviderError::Rejected(format!(
                "Simulated failure during {} of {} '{}'",
                operation, kind, name
            )));
        }
        Ok(())
    }

    fn id_for(&self, kind: ResourceKind, name: &str, inputs: &Value) -> String {
        let suffix = short_hash(name);
        match kind {
            ResourceKind::Bucket => format!("{}-{}", name, &suffix[..7]),
            ResourceKind::BucketPolicy => text(&inputs["bucket"]),
            ResourceKind::BucketObject => text(&inputs["key"]),
            ResourceKind::OriginAccessIdentity | ResourceKind::Distribution => {
                format!("E{}", suffix[..13].to_ascii_uppercase())
            }
            ResourceKind::SwagRequest => name.to_string(),
        }
    }

    /// Outputs echo the inputs plus the attributes the cloud computes.
    fn outputs_for(&self, kind: ResourceKind, id: &str, inputs: &Value) -> Outputs {
        let mut outputs: Outputs = match inputs {
            Value::Object(map) => map.clone().into_iter().collect(),
            _ => Outputs::new(),
        };
        outputs.insert("id".into(), json!(id));

        let region = &self.region;
        match kind {
            ResourceKind::Bucket => {
                outputs.insert("bucket".into(), json!(id));
                outputs.insert("arn".into(), json!(format!("arn:aws:s3:::{}", id)));
                outputs.insert(
                    "bucket_regional_domain_name".into(),
                    json!(format!("{}.s3.{}.amazonaws.com", id, region)),
                );
                outputs.insert(
                    "website_endpoint".into(),
                    json!(format!("{}.s3-website-{}.amazonaws.com", id, region)),
                );
            }
            ResourceKind::OriginAccessIdentity => {
                outputs.insert(
                    "iam_arn".into(),
                    json!(format!(
                        "arn:aws:iam::cloudfront:user/CloudFront Origin Access Identity {}",
                        id
                    )),
                );
                outputs.insert(
                    "cloudfront_access_identity_path".into(),
                    json!(format!("origin-access-identity/cloudfront/{}", id)),
                );
            }
            ResourceKind::Distribution => {
                outputs.insert(
                    "domain_name".into(),
                    json!(format!("{}.cloudfront.net", id.to_ascii_lowercase())),
                );
                outputs.insert(
                    "arn".into(),
                    json!(format!("arn:aws:cloudfront::000000000000:distribution/{}", id)),
                );
                outputs.insert("status".into(), json!("Deployed"));
            }
            ResourceKind::BucketPolicy | ResourceKind::BucketObject | ResourceKind::SwagRequest => {}
        }
        outputs
    }
}

#[async_trait]
impl ResourceProvider for SimulatedCloud {
    async fn create(
        &self,
        name: &str,
        kind: ResourceKind,
        inputs: &Value,
    ) -> Result<CreateResult, ProviderError> {
        self.record(Operation::Create, kind, name, Some(inputs));
        self.check_failure(kind, Operation::Create, name)?;
        let id = self.id_for(kind, name, inputs);
        let outputs = self.outputs_for(kind, &id, inputs);
        Ok(CreateResult { id, outputs })
    }

    async fn read(&self, current: &ResourceState) -> Result<Option<Outputs>, ProviderError> {
        self.record(Operation::Read, current.kind, &current.name, None);
        Ok(Some(self.outputs_for(current.kind, &current.id, &current.inputs)))
    }

    async fn update(&self, current: &ResourceState, inputs: &Value) -> Result<Outputs, ProviderError> {
        self.record(Operation::Update, current.kind, &current.name, Some(inputs));
        self.check_failure(current.kind, Operation::Update, &current.name)?;
        Ok(self.outputs_for(current.kind, &current.id, inputs))
    }

    async fn delete(&self, current: &ResourceState) -> Result<(), ProviderError> {
        self.record(Operation::Delete, current.kind, &current.name, None);
        Ok(())
    }
}

fn short_hash(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
