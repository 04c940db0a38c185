//! Component graph model for pipeline definitions.
//!
//! Graph-building functions return a `Vec<ComponentNode>`. Nodes are wired
//! together through `Channel`s: the artifact handle an output port hands to
//! the inputs of downstream nodes.

mod channel;
mod graph;
mod node;

pub mod components;

pub use channel::Channel;
pub use graph::{GraphError, topological_order};
pub use node::{ComponentNode, NodeKind};
