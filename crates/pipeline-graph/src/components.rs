//! Builders for the standard component shapes.
//!
//! Port names here are the ones graph repair looks for: a producer exposes
//! [`MODEL`], an evaluator exposes [`BLESSING`], and a deployment node
//! consumes both.

use serde_json::json;

use crate::channel::Channel;
use crate::node::{ComponentNode, NodeKind};

pub const EXAMPLES: &str = "examples";
pub const MODEL: &str = "model";
pub const BLESSING: &str = "blessing";
pub const MODEL_BLESSING: &str = "model_blessing";
pub const PUSHED_MODEL: &str = "pushed_model";

/// Ingests CSV files under `input_base` and emits examples.
pub fn csv_example_gen(input_base: impl Into<String>) -> ComponentNode {
    ComponentNode::new("CsvExampleGen", NodeKind::Other)
        .with_parameter("input_base", input_base.into())
        .with_output(EXAMPLES, "Examples")
}

/// Trains a model with the user function `run_fn`.
pub fn trainer(examples: Channel, run_fn: impl Into<String>, train_steps: u64, eval_steps: u64) -> ComponentNode {
    ComponentNode::new("Trainer", NodeKind::Producer)
        .with_input(EXAMPLES, examples)
        .with_parameter("run_fn", run_fn.into())
        .with_parameter("train_args", json!({ "num_steps": train_steps }))
        .with_parameter("eval_args", json!({ "num_steps": eval_steps }))
        .with_output(MODEL, "Model")
}

/// Evaluates `model` against `examples` and blesses it when it passes.
pub fn evaluator(examples: Channel, model: Channel) -> ComponentNode {
    ComponentNode::new("Evaluator", NodeKind::Evaluator)
        .with_input(EXAMPLES, examples)
        .with_input(MODEL, model)
        .with_output("evaluation", "ModelEvaluation")
        .with_output(BLESSING, "ModelBlessing")
}

/// Pushes `model` to a filesystem directory, gated on `blessing` when given.
pub fn pusher(model: Channel, blessing: Option<Channel>, base_directory: impl Into<String>) -> ComponentNode {
    let mut node = ComponentNode::new("Pusher", NodeKind::Deployment).with_input(MODEL, model);
    if let Some(blessing) = blessing {
        node = node.with_input(MODEL_BLESSING, blessing);
    }
    node.with_parameter(
        "push_destination",
        json!({ "filesystem": { "base_directory": base_directory.into() } }),
    )
    .with_output(PUSHED_MODEL, "PushedModel")
}
