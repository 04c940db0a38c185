//! Deployment node synthesis
//!
//! Graph-building functions usually stop at training and evaluation. When a
//! graph has no deployment node, one is appended that pushes the model of
//! the single producer to the serving directory, gated on the blessing of
//! the single evaluator if there is one.

use pipeline_graph::components::{self, BLESSING, MODEL};
use pipeline_graph::{Channel, ComponentNode, NodeKind};

use crate::error::{CompileError, Result};

/// How [`expand`] treated the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// Returned as given: a deployment node exists, or there is no producer.
    Unchanged,
    /// A deployment node was appended.
    Expanded,
}

/// Result of [`expand`]: the nodes to compile and how they were obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedGraph {
    pub nodes: Vec<ComponentNode>,
    pub outcome: Expansion,
}

impl ExpandedGraph {
    fn unchanged(nodes: &[ComponentNode]) -> Self {
        Self {
            nodes: nodes.to_vec(),
            outcome: Expansion::Unchanged,
        }
    }
}

/// Append a deployment node targeting `deployment_target` when none exists.
///
/// More than one model producer or more than one blessing node makes the
/// graph ambiguous; nothing is appended and the compile must abort.
pub fn expand(nodes: &[ComponentNode], deployment_target: &str) -> Result<ExpandedGraph> {
    if nodes.iter().any(|n| n.kind() == NodeKind::Deployment) {
        tracing::debug!("Deployment node present, graph left unchanged");
        return Ok(ExpandedGraph::unchanged(nodes));
    }

    tracing::info!("Could not find a deployment node, trying to expand");

    let producers: Vec<(&ComponentNode, &Channel)> = nodes
        .iter()
        .filter(|n| n.kind() == NodeKind::Producer)
        .filter_map(|n| n.output(MODEL).map(|model| (n, model)))
        .collect();

    let model = match producers.as_slice() {
        [] => {
            tracing::info!("No producer with a '{}' output, nothing to deploy", MODEL);
            return Ok(ExpandedGraph::unchanged(nodes));
        }
        [(_, model)] => (*model).clone(),
        many => {
            return Err(CompileError::MultipleProducers(
                many.iter().map(|(n, _)| n.id().to_string()).collect(),
            ));
        }
    };

    let blessors: Vec<(&ComponentNode, &Channel)> = nodes
        .iter()
        .filter_map(|n| n.output(BLESSING).map(|blessing| (n, blessing)))
        .collect();

    let blessing = match blessors.as_slice() {
        [] => {
            tracing::warn!("No node with a '{}' output, deployment will not be gated", BLESSING);
            None
        }
        [(_, blessing)] => Some((*blessing).clone()),
        many => {
            return Err(CompileError::MultipleBlessors(
                many.iter().map(|(n, _)| n.id().to_string()).collect(),
            ));
        }
    };

    let deployment = components::pusher(model, blessing, deployment_target);
    let id = unique_id(nodes, deployment.id());
    let deployment = deployment.with_id(id);

    tracing::info!(node = deployment.id(), target = deployment_target, "Expanded graph with deployment node");

    let mut expanded = nodes.to_vec();
    expanded.push(deployment);
    Ok(ExpandedGraph {
        nodes: expanded,
        outcome: Expansion::Expanded,
    })
}

fn unique_id(nodes: &[ComponentNode], base: &str) -> String {
    let taken = |id: &str| nodes.iter().any(|n| n.id() == id);
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|id| !taken(id.as_str()))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_graph::components::{MODEL_BLESSING, csv_example_gen, evaluator, trainer};

    const TARGET: &str = "serving_model";

    fn producer_graph() -> Vec<ComponentNode> {
        let example_gen = csv_example_gen("/data");
        let trainer = trainer(example_gen.output("examples").unwrap().clone(), "m.run_fn", 10, 1);
        vec![example_gen, trainer]
    }

    #[test]
    fn test_existing_deployment_unchanged() {
        let mut nodes = producer_graph();
        let model = nodes[1].output(MODEL).unwrap().clone();
        nodes.push(components::pusher(model, None, "/elsewhere"));

        let expanded = expand(&nodes, TARGET).unwrap();
        assert_eq!(expanded.outcome, Expansion::Unchanged);
        assert_eq!(expanded.nodes, nodes);
    }

    #[test]
    fn test_producer_and_blessor() {
        let mut nodes = producer_graph();
        let eval = evaluator(
            nodes[0].output("examples").unwrap().clone(),
            nodes[1].output(MODEL).unwrap().clone(),
        );
        nodes.push(eval);

        let expanded = expand(&nodes, TARGET).unwrap();
        assert_eq!(expanded.outcome, Expansion::Expanded);
        assert_eq!(expanded.nodes.len(), nodes.len() + 1);
        assert_eq!(&expanded.nodes[..nodes.len()], nodes.as_slice());

        let deployment = expanded.nodes.last().unwrap();
        assert_eq!(deployment.kind(), NodeKind::Deployment);
        assert_eq!(deployment.inputs()[MODEL], Channel::new("Trainer", MODEL, "Model"));
        assert_eq!(
            deployment.inputs()[MODEL_BLESSING],
            Channel::new("Evaluator", BLESSING, "ModelBlessing")
        );
        assert_eq!(
            deployment.parameters()["push_destination"]["filesystem"]["base_directory"],
            TARGET
        );
    }

    #[test]
    fn test_producer_without_blessor() {
        let nodes = producer_graph();
        let expanded = expand(&nodes, TARGET).unwrap();

        assert_eq!(expanded.outcome, Expansion::Expanded);
        let deployment = expanded.nodes.last().unwrap();
        assert!(deployment.inputs().contains_key(MODEL));
        assert!(!deployment.inputs().contains_key(MODEL_BLESSING));
    }

    #[test]
    fn test_no_producer_unchanged() {
        let expanded = expand(&[], TARGET).unwrap();
        assert_eq!(expanded.outcome, Expansion::Unchanged);
        assert!(expanded.nodes.is_empty());

        let nodes = vec![csv_example_gen("/data")];
        assert_eq!(expand(&nodes, TARGET).unwrap().nodes, nodes);
    }

    #[test]
    fn test_producer_kind_without_model_port_ignored() {
        let nodes = vec![ComponentNode::new("Tuner", NodeKind::Producer).with_output("best_hyperparameters", "HyperParameters")];
        let expanded = expand(&nodes, TARGET).unwrap();
        assert_eq!(expanded.outcome, Expansion::Unchanged);
    }

    #[test]
    fn test_two_producers_abort() {
        let mut nodes = producer_graph();
        let second = nodes[1].clone().with_id("Trainer-b");
        nodes.push(second);

        let err = expand(&nodes, TARGET).unwrap_err();
        assert!(matches!(err, CompileError::MultipleProducers(ref ids) if ids == &["Trainer", "Trainer-b"]));
    }

    #[test]
    fn test_two_blessors_abort() {
        let mut nodes = producer_graph();
        let examples = nodes[0].output("examples").unwrap().clone();
        let model = nodes[1].output(MODEL).unwrap().clone();
        nodes.push(evaluator(examples.clone(), model.clone()));
        nodes.push(evaluator(examples, model).with_id("Evaluator-b"));

        let err = expand(&nodes, TARGET).unwrap_err();
        assert!(matches!(err, CompileError::MultipleBlessors(_)));
    }

    #[test]
    fn test_deployment_id_made_unique() {
        let mut nodes = producer_graph();
        nodes.push(ComponentNode::new("Pusher", NodeKind::Other));

        let expanded = expand(&nodes, TARGET).unwrap();
        let deployment = expanded.nodes.last().unwrap();
        assert_eq!(deployment.id(), "Pusher-2");
        assert_eq!(deployment.output("pushed_model").unwrap().producer, "Pusher-2");
    }
}
