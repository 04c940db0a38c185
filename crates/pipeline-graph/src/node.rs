//! Component nodes and their kinds.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::channel::Channel;

/// Role a node plays in the graph.
///
/// Graph repair only ever asks about the kind and the declared output
/// ports of a node, never about what the node actually does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Produces a trained model (trainer-like).
    Producer,
    /// Judges a model and emits a blessing (evaluator-like).
    Evaluator,
    /// Publishes a model to a destination (pusher-like).
    Deployment,
    Other,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Producer => "producer",
            NodeKind::Evaluator => "evaluator",
            NodeKind::Deployment => "deployment",
            NodeKind::Other => "other",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work in a pipeline graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentNode {
    id: String,
    component_type: String,
    kind: NodeKind,
    inputs: BTreeMap<String, Channel>,
    outputs: BTreeMap<String, Channel>,
    parameters: BTreeMap<String, JsonValue>,
}

impl ComponentNode {
    /// Create a node whose id defaults to its component type.
    pub fn new(component_type: impl Into<String>, kind: NodeKind) -> Self {
        let component_type = component_type.into();
        Self {
            id: component_type.clone(),
            component_type,
            kind,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Set the node id. Output channels already declared follow the new id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        for channel in self.outputs.values_mut() {
            channel.producer = self.id.clone();
        }
        self
    }

    /// Consume an upstream artifact under the given input name.
    pub fn with_input(mut self, name: impl Into<String>, channel: Channel) -> Self {
        self.inputs.insert(name.into(), channel);
        self
    }

    /// Declare an output port producing artifacts of `artifact_type`.
    pub fn with_output(mut self, name: impl Into<String>, artifact_type: impl Into<String>) -> Self {
        let name = name.into();
        let channel = Channel::new(self.id.clone(), name.clone(), artifact_type);
        self.outputs.insert(name, channel);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn inputs(&self) -> &BTreeMap<String, Channel> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, Channel> {
        &self.outputs
    }

    pub fn parameters(&self) -> &BTreeMap<String, JsonValue> {
        &self.parameters
    }

    /// Channel for the named output port, if the node declares it.
    pub fn output(&self, name: &str) -> Option<&Channel> {
        self.outputs.get(name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Ids of the nodes this node consumes artifacts from, deduplicated and sorted.
    pub fn upstream_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.inputs.values().map(|c| c.producer.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_defaults_to_component_type() {
        let node = ComponentNode::new("Trainer", NodeKind::Producer);
        assert_eq!(node.id(), "Trainer");
        assert_eq!(node.component_type(), "Trainer");
    }

    #[test]
    fn test_with_id_rewrites_output_channels() {
        let node = ComponentNode::new("Trainer", NodeKind::Producer)
            .with_output("model", "Model")
            .with_id("trainer-a");

        let model = node.output("model").unwrap();
        assert_eq!(model.producer, "trainer-a");
        assert_eq!(model.output, "model");
        assert_eq!(model.artifact_type, "Model");
    }

    #[test]
    fn test_upstream_ids_deduplicated() {
        let node = ComponentNode::new("Evaluator", NodeKind::Evaluator)
            .with_input("examples", Channel::new("gen", "examples", "Examples"))
            .with_input("model", Channel::new("trainer", "model", "Model"))
            .with_input("baseline", Channel::new("trainer", "model", "Model"));

        assert_eq!(node.upstream_ids(), vec!["gen", "trainer"]);
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&NodeKind::Deployment).unwrap();
        assert_eq!(json, "\"deployment\"");
        assert_eq!(NodeKind::Producer.to_string(), "producer");
    }
}
