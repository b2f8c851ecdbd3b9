use std::collections::HashMap;

use super::{lookup_in, step_op, ApplyError, Engine, Plan, PlannedStep, StepOp};
use crate::graph::ResourceGraph;
use crate::models::*;
use crate::stack::StackDeclaration;

impl Engine {
    /// Report what [`Engine::apply`] would do, without calling any provider.
    ///
    /// Inputs that reference a producer which is itself about to change cannot be
    /// resolved yet; such nodes are reported as changing.
    pub fn preview(&self, decl: &StackDeclaration) -> Result<Plan, ApplyError> {
        let graph = ResourceGraph::from_nodes(&decl.nodes)?;
        let prior = self.db.load_stack(&decl.name)?;
        self.check_providers(decl.nodes.iter().map(|n| n.kind))?;

        let nodes: HashMap<&str, &ResourceNode> =
            decl.nodes.iter().map(|n| (n.name.as_str(), n)).collect();
        let mut settled: HashMap<String, Outputs> = HashMap::new();
        let mut steps = Vec::with_capacity(decl.nodes.len());

        for name in graph.apply_order() {
            let node = nodes[name];
            let recorded = prior.get(name);
            let resolved = resolve(node, &settled)?;
            let op = step_op(recorded, node.kind, resolved.as_ref());

            if let (StepOp::Same, Some(r)) = (op, recorded) {
                settled.insert(name.to_string(), r.outputs.clone());
            }
            tracing::debug!(resource = name, op = op.as_str(), "Planned step");
            steps.push(PlannedStep {
                name: name.to_string(),
                kind: node.kind,
                op,
            });
        }

        let removed: Vec<&ResourceState> = prior
            .resources
            .values()
            .filter(|r| !graph.contains(&r.name))
            .collect();
        let teardown = ResourceGraph::from_recorded(
            removed
                .iter()
                .map(|r| (r.name.clone(), r.dependencies.clone())),
        )?;
        for name in teardown.teardown_order() {
            if let Some(r) = prior.get(name) {
                steps.push(PlannedStep {
                    name: r.name.clone(),
                    kind: r.kind,
                    op: StepOp::Delete,
                });
            }
        }

        Ok(Plan {
            stack: decl.name.clone(),
            steps,
        })
    }
}

/// Resolve a node's inputs against the outputs settled so far.
///
/// `Ok(None)` means some producer is still pending.
pub(super) fn resolve(
    node: &ResourceNode,
    settled: &HashMap<String, Outputs>,
) -> Result<Option<serde_json::Value>, ApplyError> {
    resolve_map(&node.inputs, &lookup_in(settled)).map_err(|reference| ApplyError::MissingOutput {
        consumer: node.name.clone(),
        reference,
    })
}
