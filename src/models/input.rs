use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy;

/// Output attributes of an applied resource.
pub type Outputs = BTreeMap<String, Value>;

/// Input attributes of a declared resource.
pub type Inputs = BTreeMap<String, Input>;

/// Names one output attribute of another node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub node: String,
    pub field: String,
}

impl OutputRef {
    pub fn new(node: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.field)
    }
}

/// A single input value of a resource node.
///
/// Inputs form a tree: literal JSON leaves, references to other nodes' outputs, and
/// nested lists and maps. Any [`Input::Output`] or [`Input::Derived`] anywhere in the
/// tree makes the owning node depend on the referenced producer.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Literal(Value),
    Output(OutputRef),
    List(Vec<Input>),
    Map(BTreeMap<String, Input>),
    Derived(Derived),
}

/// A pure transform computed from producer outputs once they are known.
#[derive(Debug, Clone, PartialEq)]
pub enum Derived {
    /// Anonymous `s3:GetObject` on every object of the bucket.
    PublicReadPolicy { bucket: OutputRef },
    /// `s3:GetObject` restricted to the CDN origin-access-identity.
    CdnOnlyPolicy {
        bucket: OutputRef,
        identity_arn: OutputRef,
    },
}

/// Result of looking up one referenced output.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Producer applied and the field exists.
    Found(Value),
    /// Producer has not been applied yet (preview only).
    Pending,
    /// Producer applied but does not expose the field.
    Missing,
}

impl Input {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Wrap a serializable value as a literal input.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Literal(serde_json::to_value(value)?))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Input)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Collect every output reference in this input tree.
    pub fn references(&self) -> Vec<&OutputRef> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a OutputRef>) {
        match self {
            Self::Literal(_) => {}
            Self::Output(r) => out.push(r),
            Self::List(items) => items.iter().for_each(|i| i.collect_references(out)),
            Self::Map(entries) => entries.values().for_each(|i| i.collect_references(out)),
            Self::Derived(Derived::PublicReadPolicy { bucket }) => out.push(bucket),
            Self::Derived(Derived::CdnOnlyPolicy {
                bucket,
                identity_arn,
            }) => {
                out.push(bucket);
                out.push(identity_arn);
            }
        }
    }

    /// Resolve this input to a concrete JSON value.
    ///
    /// Returns `Ok(None)` when any referenced producer is still pending and
    /// `Err(reference)` when a producer was applied without the referenced field.
    pub fn resolve<F>(&self, lookup: &F) -> Result<Option<Value>, OutputRef>
    where
        F: Fn(&OutputRef) -> Lookup,
    {
        match self {
            Self::Literal(v) => Ok(Some(v.clone())),
            Self::Output(r) => resolve_ref(r, lookup),
            Self::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item.resolve(lookup)? {
                        Some(v) => values.push(v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Array(values)))
            }
            Self::Map(entries) => resolve_map(entries, lookup),
            Self::Derived(Derived::PublicReadPolicy { bucket }) => {
                let Some(bucket) = resolve_ref(bucket, lookup)? else {
                    return Ok(None);
                };
                Ok(Some(Value::String(policy::public_read_policy(&as_text(
                    &bucket,
                )))))
            }
            Self::Derived(Derived::CdnOnlyPolicy {
                bucket,
                identity_arn,
            }) => {
                let (Some(bucket), Some(arn)) =
                    (resolve_ref(bucket, lookup)?, resolve_ref(identity_arn, lookup)?)
                else {
                    return Ok(None);
                };
                Ok(Some(Value::String(policy::cdn_only_policy(
                    &as_text(&bucket),
                    &as_text(&arn),
                ))))
            }
        }
    }
}

/// Resolve a whole input map to a JSON object.
pub fn resolve_map<F>(entries: &Inputs, lookup: &F) -> Result<Option<Value>, OutputRef>
where
    F: Fn(&OutputRef) -> Lookup,
{
    let mut object = serde_json::Map::new();
    for (key, input) in entries {
        match input.resolve(lookup)? {
            Some(v) => {
                object.insert(key.clone(), v);
            }
            None => return Ok(None),
        }
    }
    Ok(Some(Value::Object(object)))
}

fn resolve_ref<F>(r: &OutputRef, lookup: &F) -> Result<Option<Value>, OutputRef>
where
    F: Fn(&OutputRef) -> Lookup,
{
    match lookup(r) {
        Lookup::Found(v) => Ok(Some(v)),
        Lookup::Pending => Ok(None),
        Lookup::Missing => Err(r.clone()),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
