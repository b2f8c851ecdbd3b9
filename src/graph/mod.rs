//! Dependency graph over resource nodes.
//!
//! Edges are implicit: a node depends on every node whose outputs its inputs reference.
//! The graph is validated on construction (no duplicates, no dangling producers, no
//! cycles) and yields a deterministic apply order, with ties broken by declaration order.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::models::ResourceNode;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Resource '{0}' is declared more than once")]
    DuplicateNode(String),

    #[error("Resource '{consumer}' references undeclared resource '{producer}'")]
    UnknownProducer { consumer: String, producer: String },

    #[error("Dependency cycle between resources: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ResourceGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    dependencies: Vec<BTreeSet<usize>>,
    dependents: Vec<BTreeSet<usize>>,
    order: Vec<usize>,
}

impl ResourceGraph {
    /// Build the graph of a stack declaration.
    pub fn from_nodes(nodes: &[ResourceNode]) -> Result<Self, GraphError> {
        let entries = nodes
            .iter()
            .map(|n| (n.name.clone(), n.dependencies().into_iter().collect()));
        Self::build(entries, true)
    }

    /// Build the graph of recorded resources.
    ///
    /// Recorded dependencies on resources that are no longer recorded are dropped
    /// rather than rejected.
    pub fn from_recorded<I>(entries: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        Self::build(entries, false)
    }

    fn build<I>(entries: I, strict: bool) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let entries: Vec<(String, Vec<String>)> = entries.into_iter().collect();

        let mut names = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        for (name, _) in &entries {
            if index.insert(name.clone(), names.len()).is_some() {
                return Err(GraphError::DuplicateNode(name.clone()));
            }
            names.push(name.clone());
        }

        let mut dependencies = vec![BTreeSet::new(); names.len()];
        let mut dependents = vec![BTreeSet::new(); names.len()];
        for (consumer, (name, deps)) in entries.iter().enumerate() {
            for producer in deps {
                match index.get(producer) {
                    Some(&p) => {
                        dependencies[consumer].insert(p);
                        dependents[p].insert(consumer);
                    }
                    None if strict => {
                        return Err(GraphError::UnknownProducer {
                            consumer: name.clone(),
                            producer: producer.clone(),
                        })
                    }
                    None => {}
                }
            }
        }

        let order = topological_order(&dependencies, &dependents).map_err(|stuck| {
            GraphError::Cycle(stuck.into_iter().map(|i| names[i].clone()).collect())
        })?;

        Ok(Self {
            names,
            index,
            dependencies,
            dependents,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Producers before consumers.
    pub fn apply_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    /// Consumers before producers.
    pub fn teardown_order(&self) -> Vec<&str> {
        self.order.iter().rev().map(|&i| self.names[i].as_str()).collect()
    }

    /// Direct producers of `name`.
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.dependencies)
    }

    /// Direct consumers of `name`.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.dependents)
    }

    fn neighbours<'a>(&'a self, name: &str, edges: &'a [BTreeSet<usize>]) -> Vec<&'a str> {
        self.index
            .get(name)
            .map(|&i| edges[i].iter().map(|&j| self.names[j].as_str()).collect())
            .unwrap_or_default()
    }
}

/// Kahn's algorithm. Ready nodes are taken lowest index first; on a cycle the indices
/// that could never be scheduled are returned.
fn topological_order(
    dependencies: &[BTreeSet<usize>],
    dependents: &[BTreeSet<usize>],
) -> Result<Vec<usize>, Vec<usize>> {
    let mut remaining: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..remaining.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(remaining.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &consumer in &dependents[next] {
            remaining[consumer] -= 1;
            if remaining[consumer] == 0 {
                ready.insert(consumer);
            }
        }
    }

    if order.len() == remaining.len() {
        Ok(order)
    } else {
        Err((0..remaining.len()).filter(|&i| remaining[i] > 0).collect())
    }
}
