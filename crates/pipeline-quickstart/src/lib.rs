//! Quickstart penguin pipeline.
//!
//! Graph-building functions return components only: the compiler derives
//! the pipeline name, root and deployment target from its configuration and
//! synthesizes the Pusher when one is missing.

use anyhow::{Context, Result};
use pipeline_graph::ComponentNode;
use pipeline_graph::components::{self, EXAMPLES, MODEL};

/// Environment variable pointing at the CSV data directory.
pub const DATA_ROOT_VAR: &str = "PENGUIN_DATA_ROOT";

const DEFAULT_DATA_ROOT: &str = "/data";
const RUN_FN: &str = "penguin_pipeline.trainer.run_fn";

/// Example generation and training; the compiler adds an ungated Pusher.
pub fn create_components() -> Result<Vec<ComponentNode>> {
    let data_root = std::env::var(DATA_ROOT_VAR).unwrap_or_else(|_| DEFAULT_DATA_ROOT.to_string());

    let example_gen = components::csv_example_gen(data_root);
    let trainer = components::trainer(output(&example_gen, EXAMPLES)?, RUN_FN, 100, 5);

    Ok(vec![example_gen, trainer])
}

/// Same as [`create_components`] plus an Evaluator, so the Pusher is gated on its blessing.
pub fn create_evaluated_components() -> Result<Vec<ComponentNode>> {
    let mut nodes = create_components()?;
    let evaluator = components::evaluator(output(&nodes[0], EXAMPLES)?, output(&nodes[1], MODEL)?);
    nodes.push(evaluator);
    Ok(nodes)
}

fn output(node: &ComponentNode, name: &str) -> Result<pipeline_graph::Channel> {
    node.output(name)
        .cloned()
        .with_context(|| format!("{} has no '{}' output", node.id(), name))
}
