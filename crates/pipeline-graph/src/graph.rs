//! Structural validation and ordering of a component graph
//!
//! This module handles:
//! - Rejecting duplicate node ids
//! - Checking that every input channel points at a declared output
//! - Detecting circular dependencies
//! - Producing a dependency-first emission order

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::node::ComponentNode;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate node id: '{0}'")]
    DuplicateId(String),

    #[error("Node '{node}' input '{input}' references unknown node '{producer}'")]
    UnknownProducer {
        node: String,
        input: String,
        producer: String,
    },

    #[error("Node '{node}' input '{input}' references output '{output}' which '{producer}' does not declare")]
    UnknownOutput {
        node: String,
        input: String,
        producer: String,
        output: String,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),
}

/// Validate the graph and return its nodes with every producer ahead of its consumers.
///
/// Nodes without a dependency relation keep their relative input order.
pub fn topological_order(nodes: &[ComponentNode]) -> Result<Vec<&ComponentNode>, GraphError> {
    let mut by_id: HashMap<&str, &ComponentNode> = HashMap::new();
    for node in nodes {
        if by_id.insert(node.id(), node).is_some() {
            return Err(GraphError::DuplicateId(node.id().to_string()));
        }
    }

    for node in nodes {
        for (input, channel) in node.inputs() {
            let producer = by_id.get(channel.producer.as_str()).ok_or_else(|| {
                GraphError::UnknownProducer {
                    node: node.id().to_string(),
                    input: input.clone(),
                    producer: channel.producer.clone(),
                }
            })?;
            if !producer.has_output(&channel.output) {
                return Err(GraphError::UnknownOutput {
                    node: node.id().to_string(),
                    input: input.clone(),
                    producer: channel.producer.clone(),
                    output: channel.output.clone(),
                });
            }
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    let mut visited = HashSet::new();
    let mut visiting = HashSet::new();
    for node in nodes {
        visit(node, &by_id, &mut visiting, &mut visited, &mut order)?;
    }

    Ok(order)
}

fn visit<'a>(
    node: &'a ComponentNode,
    by_id: &HashMap<&str, &'a ComponentNode>,
    visiting: &mut HashSet<&'a str>,
    visited: &mut HashSet<&'a str>,
    order: &mut Vec<&'a ComponentNode>,
) -> Result<(), GraphError> {
    if visited.contains(node.id()) {
        return Ok(());
    }
    if !visiting.insert(node.id()) {
        return Err(GraphError::CircularDependency(node.id().to_string()));
    }

    // Producers first
    for upstream in node.upstream_ids() {
        if let Some(dep) = by_id.get(upstream) {
            visit(*dep, by_id, visiting, visited, order)?;
        }
    }

    visiting.remove(node.id());
    visited.insert(node.id());
    order.push(node);
    Ok(())
}
