use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use super::plan::resolve;
use super::{
    lookup_in, step_op, ApplyError, ApplyReport, Engine, RefreshChange, RefreshOutcome, StepOp,
    StepOutcome, StepStatus,
};
use crate::graph::ResourceGraph;
use crate::models::*;
use crate::provider::ProviderError;
use crate::stack::StackDeclaration;

impl Engine {
    /// Reconcile the recorded state of `decl.name` with `decl`.
    ///
    /// Returns `Err` only for errors that stop the whole run: invalid graph, missing
    /// provider, missing producer output, fatal provider error or state store failure.
    /// Per-resource failures are reported in the returned [`ApplyReport`].
    pub async fn apply(&self, decl: &StackDeclaration) -> Result<ApplyReport, ApplyError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("apply", stack = %decl.name, run = %run_id);
        self.apply_declaration(decl, run_id).instrument(span).await
    }

    async fn apply_declaration(
        &self,
        decl: &StackDeclaration,
        run_id: Uuid,
    ) -> Result<ApplyReport, ApplyError> {
        let graph = ResourceGraph::from_nodes(&decl.nodes)?;
        let prior = self.db.load_stack(&decl.name)?;

        let removed: Vec<&ResourceState> = prior
            .resources
            .values()
            .filter(|r| !graph.contains(&r.name))
            .collect();
        self.check_providers(
            decl.nodes
                .iter()
                .map(|n| n.kind)
                .chain(removal_kinds(&removed)),
        )?;

        let nodes: HashMap<&str, &ResourceNode> =
            decl.nodes.iter().map(|n| (n.name.as_str(), n)).collect();
        let mut settled: HashMap<String, Outputs> = HashMap::new();
        // Failed or skipped node -> the failed node that blocked it.
        let mut blocked: HashMap<String, String> = HashMap::new();
        let mut steps = Vec::new();

        tracing::info!(resources = decl.nodes.len(), "Applying stack");

        for name in graph.apply_order() {
            let node = nodes[name];
            let recorded = prior.get(name);

            let blocker = graph
                .dependencies(name)
                .into_iter()
                .find_map(|d| blocked.get(d).cloned());
            if let Some(blocker) = blocker {
                tracing::warn!(resource = name, blocked_by = %blocker, "Skipping resource");
                steps.push(StepOutcome {
                    name: name.to_string(),
                    kind: node.kind,
                    op: step_op(recorded, node.kind, None),
                    status: StepStatus::Skipped {
                        blocked_by: blocker.clone(),
                    },
                });
                blocked.insert(name.to_string(), blocker);
                continue;
            }

            // Every producer is settled at this point, so nothing resolves as pending.
            let inputs = resolve(node, &settled)?.unwrap_or(Value::Null);
            let op = step_op(recorded, node.kind, Some(&inputs));

            let result = match (op, recorded) {
                (StepOp::Same, Some(r)) => {
                    tracing::debug!(resource = name, "Resource unchanged");
                    settled.insert(name.to_string(), r.outputs.clone());
                    steps.push(StepOutcome {
                        name: name.to_string(),
                        kind: node.kind,
                        op,
                        status: StepStatus::Unchanged,
                    });
                    continue;
                }
                (StepOp::Update, Some(r)) => self.update_resource(r, &inputs).await,
                (StepOp::Replace, Some(r)) => match self.delete_recorded(r).await {
                    Ok(()) => {
                        // The old resource is gone even if the create below fails.
                        self.db.delete_resource(&decl.name, name)?;
                        self.create_resource(node, &inputs).await
                    }
                    Err(e) => Err(e),
                },
                _ => self.create_resource(node, &inputs).await,
            };

            match result {
                Ok((id, outputs)) => {
                    let now = Utc::now();
                    let created_at = match (op, recorded) {
                        (StepOp::Update, Some(r)) => r.created_at,
                        _ => now,
                    };
                    let record = ResourceState {
                        name: name.to_string(),
                        kind: node.kind,
                        id,
                        inputs,
                        outputs: outputs.clone(),
                        dependencies: node.dependencies().into_iter().collect(),
                        created_at,
                        updated_at: now,
                    };
                    self.db.save_resource(&decl.name, &record)?;
                    tracing::info!(resource = name, kind = %node.kind, op = op.as_str(), "Applied");
                    settled.insert(name.to_string(), outputs);
                    steps.push(StepOutcome {
                        name: name.to_string(),
                        kind: node.kind,
                        op,
                        status: StepStatus::Applied,
                    });
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(resource = name, error = %e, "Fatal provider error, aborting apply");
                    return Err(ApplyError::Aborted {
                        resource: name.to_string(),
                        source: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(resource = name, op = op.as_str(), error = %e, "Resource failed");
                    blocked.insert(name.to_string(), name.to_string());
                    steps.push(StepOutcome {
                        name: name.to_string(),
                        kind: node.kind,
                        op,
                        status: StepStatus::Failed {
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }

        steps.extend(self.delete_resources(&decl.name, &removed).await?);

        let lookup = lookup_in(&settled);
        let mut exports = BTreeMap::new();
        for (key, value) in &decl.exports {
            match value.resolve(&lookup) {
                Ok(Some(v)) => {
                    exports.insert(key.clone(), v);
                }
                Ok(None) => tracing::debug!(export = %key, "Export unavailable"),
                Err(reference) => {
                    tracing::warn!(export = %key, %reference, "Export references a missing output")
                }
            }
        }
        self.db.replace_exports(&decl.name, &exports)?;

        let report = ApplyReport {
            run_id,
            stack: decl.name.clone(),
            steps,
            exports,
        };
        if report.is_success() {
            tracing::info!("Apply finished");
        } else {
            tracing::warn!(
                failed = report.failed().len(),
                skipped = report.skipped().len(),
                "Apply finished with failures"
            );
        }
        Ok(report)
    }

    async fn create_resource(
        &self,
        node: &ResourceNode,
        inputs: &Value,
    ) -> Result<(String, Outputs), ProviderError> {
        let provider = self
            .providers
            .get(node.kind)
            .ok_or_else(|| ProviderError::Rejected(format!("No provider for {}", node.kind)))?;
        let created = provider.create(&node.name, node.kind, inputs).await?;
        Ok((created.id, created.outputs))
    }

    async fn update_resource(
        &self,
        recorded: &ResourceState,
        inputs: &Value,
    ) -> Result<(String, Outputs), ProviderError> {
        let provider = self
            .providers
            .get(recorded.kind)
            .ok_or_else(|| ProviderError::Rejected(format!("No provider for {}", recorded.kind)))?;
        let outputs = provider.update(recorded, inputs).await?;
        Ok((recorded.id.clone(), outputs))
    }

    async fn delete_recorded(&self, recorded: &ResourceState) -> Result<(), ProviderError> {
        let provider = self
            .providers
            .get(recorded.kind)
            .ok_or_else(|| ProviderError::Rejected(format!("No provider for {}", recorded.kind)))?;
        provider.delete(recorded).await
    }

    /// Delete recorded resources, consumers before producers. A resource whose consumer
    /// could not be deleted is left alone. Create-only resources are forgotten without a
    /// provider call.
    async fn delete_resources(
        &self,
        stack: &str,
        records: &[&ResourceState],
    ) -> Result<Vec<StepOutcome>, ApplyError> {
        let teardown = ResourceGraph::from_recorded(
            records
                .iter()
                .map(|r| (r.name.clone(), r.dependencies.clone())),
        )?;
        let by_name: HashMap<&str, &ResourceState> =
            records.iter().map(|r| (r.name.as_str(), *r)).collect();
        let mut kept: HashSet<String> = HashSet::new();
        let mut steps = Vec::with_capacity(records.len());

        for name in teardown.teardown_order() {
            let record = by_name[name];
            if let Some(consumer) = teardown
                .dependents(name)
                .into_iter()
                .find(|d| kept.contains(*d))
            {
                tracing::warn!(resource = name, blocked_by = consumer, "Skipping delete");
                steps.push(StepOutcome {
                    name: name.to_string(),
                    kind: record.kind,
                    op: StepOp::Delete,
                    status: StepStatus::Skipped {
                        blocked_by: consumer.to_string(),
                    },
                });
                kept.insert(name.to_string());
                continue;
            }

            if record.kind.is_create_only() {
                self.db.delete_resource(stack, name)?;
                tracing::warn!(
                    resource = name,
                    kind = %record.kind,
                    "Forgetting create-only resource; nothing was deleted"
                );
                steps.push(StepOutcome {
                    name: name.to_string(),
                    kind: record.kind,
                    op: StepOp::Delete,
                    status: StepStatus::Forgotten,
                });
                continue;
            }

            let provider = self.provider(record.kind)?;
            match provider.delete(record).await {
                Ok(()) => {
                    self.db.delete_resource(stack, name)?;
                    tracing::info!(resource = name, kind = %record.kind, "Deleted");
                    steps.push(StepOutcome {
                        name: name.to_string(),
                        kind: record.kind,
                        op: StepOp::Delete,
                        status: StepStatus::Applied,
                    });
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(resource = name, error = %e, "Fatal provider error, aborting");
                    return Err(ApplyError::Aborted {
                        resource: name.to_string(),
                        source: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(resource = name, error = %e, "Delete failed, keeping record");
                    kept.insert(name.to_string());
                    steps.push(StepOutcome {
                        name: name.to_string(),
                        kind: record.kind,
                        op: StepOp::Delete,
                        status: StepStatus::Failed {
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(steps)
    }

    /// Delete every recorded resource of `stack`.
    pub async fn destroy(&self, stack: &str) -> Result<ApplyReport, ApplyError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("destroy", stack = %stack, run = %run_id);
        self.destroy_stack(stack, run_id).instrument(span).await
    }

    async fn destroy_stack(&self, stack: &str, run_id: Uuid) -> Result<ApplyReport, ApplyError> {
        let prior = self.db.load_stack(stack)?;
        let records: Vec<&ResourceState> = prior.resources.values().collect();
        self.check_providers(removal_kinds(&records))?;

        let steps = self.delete_resources(stack, &records).await?;
        let report = ApplyReport {
            run_id,
            stack: stack.to_string(),
            steps,
            exports: BTreeMap::new(),
        };

        if report.is_success() {
            self.db.delete_stack(stack)?;
            tracing::info!("Stack destroyed");
        } else {
            self.db.replace_exports(stack, &BTreeMap::new())?;
            tracing::warn!(failed = report.failed().len(), "Destroy left resources behind");
        }
        Ok(report)
    }

    /// Re-read every recorded resource of `stack` and record what the providers report.
    pub async fn refresh(&self, stack: &str) -> Result<Vec<RefreshOutcome>, ApplyError> {
        let prior = self.db.load_stack(stack)?;
        self.check_providers(
            prior
                .resources
                .values()
                .map(|r| r.kind)
                .filter(|k| !k.is_create_only()),
        )?;

        let mut outcomes = Vec::with_capacity(prior.resources.len());
        for record in prior.resources.values() {
            let Some(provider) = self.providers.get(record.kind) else {
                // Only create-only kinds get here without a provider.
                outcomes.push(RefreshOutcome {
                    name: record.name.clone(),
                    kind: record.kind,
                    change: RefreshChange::Kept,
                });
                continue;
            };
            let change = match provider.read(record).await {
                Ok(Some(outputs)) if outputs == record.outputs => RefreshChange::Unchanged,
                Ok(Some(outputs)) => {
                    let mut updated = record.clone();
                    updated.outputs = outputs;
                    updated.updated_at = Utc::now();
                    self.db.save_resource(stack, &updated)?;
                    RefreshChange::Updated
                }
                Ok(None) => {
                    self.db.delete_resource(stack, &record.name)?;
                    RefreshChange::Removed
                }
                Err(e) if e.is_unsupported() => RefreshChange::Kept,
                Err(e) if e.is_fatal() => {
                    return Err(ApplyError::Aborted {
                        resource: record.name.clone(),
                        source: e,
                    })
                }
                Err(e) => RefreshChange::Failed {
                    reason: e.to_string(),
                },
            };
            tracing::debug!(resource = %record.name, change = ?change, "Refreshed");
            outcomes.push(RefreshOutcome {
                name: record.name.clone(),
                kind: record.kind,
                change,
            });
        }
        Ok(outcomes)
    }
}

/// Kinds whose removal needs a provider call.
fn removal_kinds<'a>(records: &'a [&ResourceState]) -> impl Iterator<Item = ResourceKind> + 'a {
    records
        .iter()
        .map(|r| r.kind)
        .filter(|k| !k.is_create_only())
}
