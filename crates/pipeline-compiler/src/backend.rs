//! Graph compiler backends
//!
//! A backend turns a validated, ordered node list into the raw manifest of
//! one schema family and writes it in its own native format. The compiler
//! never looks at a backend's bytes, only at the structure it parses back.
//!
//! - [`WorkflowBackend`]: an Argo `Workflow` YAML document (`v1`)
//! - [`PipelineSpecBackend`]: a JSON pipeline spec, schema `2.0.0` (`v2`)

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use pipeline_graph::ComponentNode;
use serde_json::{Map, Value, json};

use crate::config::ExecutionMode;
use crate::error::{CompileError, Result};

/// Image entrypoint every component container runs.
pub const CONTAINER_ENTRYPOINT: [&str; 3] = ["python", "-m", "tfx.orchestration.kubeflow.container_entrypoint"];

pub const PIPELINE_SPEC_SCHEMA_VERSION: &str = "2.0.0";

/// Everything a backend needs to emit a manifest.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    /// Sanitized pipeline name.
    pub name: String,
    pub display_name: String,
    pub root: String,
    pub image: String,
    /// Nodes with every producer ahead of its consumers.
    pub nodes: Vec<ComponentNode>,
    /// Engine argument tokens (`--key=value`).
    pub engine_args: Vec<String>,
    pub enable_cache: bool,
}

/// Emits the raw manifest for a [`PipelineDefinition`].
pub trait GraphCompiler {
    /// File name of the native output; its extension tells how to parse it back.
    fn output_file_name(&self) -> &str;

    /// Write the raw manifest to `output`.
    fn compile_graph(&self, definition: &PipelineDefinition, output: &Path) -> Result<()>;
}

/// Backend for an execution mode.
pub fn for_mode(mode: ExecutionMode) -> Box<dyn GraphCompiler> {
    match mode {
        ExecutionMode::V1 => Box::new(WorkflowBackend),
        ExecutionMode::V2 => Box::new(PipelineSpecBackend),
    }
}

fn container_args(definition: &PipelineDefinition, node: &ComponentNode) -> Result<Vec<String>> {
    let serialized = serde_json::to_string(node).map_err(|e| CompileError::backend(e.to_string()))?;
    let engine_args = serde_json::to_string(&definition.engine_args).map_err(|e| CompileError::backend(e.to_string()))?;

    Ok(vec![
        "--pipeline_name".into(),
        definition.name.clone(),
        "--pipeline_root".into(),
        definition.root.clone(),
        "--node_id".into(),
        node.id().to_string(),
        "--component_type".into(),
        node.component_type().to_string(),
        "--serialized_component".into(),
        serialized,
        "--beam_pipeline_args".into(),
        engine_args,
        "--enable_cache".into(),
        definition.enable_cache.to_string(),
    ])
}

/// Argo template names are DNS labels.
fn template_name(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

/// Template name per node id. Names that collide with each other or with
/// `reserved` get a `-2`, `-3`, ... suffix in node order.
fn template_names<'a>(nodes: &'a [ComponentNode], reserved: &str) -> HashMap<&'a str, String> {
    let mut taken: HashSet<String> = HashSet::from([reserved.to_string()]);
    let mut names = HashMap::with_capacity(nodes.len());
    for node in nodes {
        let base = template_name(node.id());
        let name = if taken.contains(&base) {
            (2..)
                .map(|n| format!("{}-{}", base, n))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_else(|| base.clone())
        } else {
            base
        };
        taken.insert(name.clone());
        names.insert(node.id(), name);
    }
    names
}

/// Emits an Argo `Workflow` with one DAG template and one container template per node.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowBackend;

impl WorkflowBackend {
    pub fn build(&self, definition: &PipelineDefinition) -> Result<Value> {
        let entrypoint = template_name(&definition.name);
        let names = template_names(&definition.nodes, &entrypoint);
        let name_of = |id: &str| -> Result<String> {
            names
                .get(id)
                .cloned()
                .ok_or_else(|| CompileError::backend(format!("no template for node '{}'", id)))
        };

        let mut tasks = Vec::new();
        let mut templates = Vec::new();

        for node in &definition.nodes {
            let name = name_of(node.id())?;
            let mut task = json!({ "name": name, "template": name });
            let dependencies = node
                .upstream_ids()
                .into_iter()
                .map(name_of)
                .collect::<Result<Vec<String>>>()?;
            if !dependencies.is_empty() {
                task["dependencies"] = json!(dependencies);
            }
            tasks.push(task);

            templates.push(json!({
                "name": name,
                "metadata": {
                    "labels": {
                        "pipelines.kubeflow.org/component-type": node.component_type(),
                        "pipelines.kubeflow.org/component-kind": node.kind().as_str(),
                    }
                },
                "container": {
                    "image": definition.image,
                    "command": CONTAINER_ENTRYPOINT,
                    "args": container_args(definition, node)?,
                },
            }));
        }

        templates.insert(0, json!({ "name": entrypoint, "dag": { "tasks": tasks } }));

        Ok(json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Workflow",
            "metadata": {
                "generateName": format!("{}-", entrypoint),
                "annotations": {
                    "pipelines.kubeflow.org/pipeline_spec": json!({ "name": definition.display_name }).to_string(),
                },
            },
            "spec": {
                "entrypoint": entrypoint,
                "arguments": {
                    "parameters": [{ "name": "pipeline-root", "value": definition.root }],
                },
                "serviceAccountName": "pipeline-runner",
                "templates": templates,
            },
        }))
    }
}

impl GraphCompiler for WorkflowBackend {
    fn output_file_name(&self) -> &str {
        "workflow.yaml"
    }

    fn compile_graph(&self, definition: &PipelineDefinition, output: &Path) -> Result<()> {
        let workflow = self.build(definition)?;
        let mut writer = BufWriter::new(File::create(output)?);
        serde_yaml::to_writer(&mut writer, &workflow).map_err(|e| CompileError::backend(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }
}

/// Emits a pipeline spec: component definitions, executors, and the root DAG.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineSpecBackend;

impl PipelineSpecBackend {
    pub fn build(&self, definition: &PipelineDefinition) -> Result<Value> {
        let mut components = Map::new();
        let mut executors = Map::new();
        let mut tasks = Map::new();

        for node in &definition.nodes {
            let id = node.id();
            let component_name = format!("{}_component", id);
            let executor_label = format!("{}_executor", id);

            let input_artifacts: Map<String, Value> = node
                .inputs()
                .iter()
                .map(|(name, channel)| (name.clone(), artifact_type(&channel.artifact_type)))
                .collect();
            let output_artifacts: Map<String, Value> = node
                .outputs()
                .iter()
                .map(|(name, channel)| (name.clone(), artifact_type(&channel.artifact_type)))
                .collect();
            let parameter_types: Map<String, Value> = node
                .parameters()
                .keys()
                .map(|name| (name.clone(), json!({ "type": "STRING" })))
                .collect();

            components.insert(
                component_name.clone(),
                json!({
                    "executorLabel": executor_label,
                    "inputDefinitions": { "artifacts": input_artifacts, "parameters": parameter_types },
                    "outputDefinitions": { "artifacts": output_artifacts },
                }),
            );

            executors.insert(
                executor_label,
                json!({
                    "container": {
                        "image": definition.image,
                        "command": CONTAINER_ENTRYPOINT,
                        "args": container_args(definition, node)?,
                    }
                }),
            );

            let task_artifacts: Map<String, Value> = node
                .inputs()
                .iter()
                .map(|(name, channel)| {
                    (
                        name.clone(),
                        json!({ "taskOutputArtifact": { "producerTask": channel.producer, "outputArtifactKey": channel.output } }),
                    )
                })
                .collect();
            let task_parameters: BTreeMap<&String, Value> = node
                .parameters()
                .iter()
                .map(|(name, value)| {
                    (
                        name,
                        json!({ "runtimeValue": { "constantValue": { "stringValue": parameter_text(value) } } }),
                    )
                })
                .collect();

            tasks.insert(
                id.to_string(),
                json!({
                    "taskInfo": { "name": id },
                    "componentRef": { "name": component_name },
                    "dependentTasks": node.upstream_ids(),
                    "inputs": { "artifacts": task_artifacts, "parameters": task_parameters },
                }),
            );
        }

        Ok(json!({
            "pipelineInfo": { "name": definition.name },
            "schemaVersion": PIPELINE_SPEC_SCHEMA_VERSION,
            "sdkVersion": format!("pipeline-compiler-{}", env!("CARGO_PKG_VERSION")),
            "defaultPipelineRoot": definition.root,
            "components": components,
            "deploymentSpec": { "executors": executors },
            "root": { "dag": { "tasks": tasks } },
        }))
    }
}

impl GraphCompiler for PipelineSpecBackend {
    fn output_file_name(&self) -> &str {
        "pipeline.json"
    }

    fn compile_graph(&self, definition: &PipelineDefinition, output: &Path) -> Result<()> {
        let spec = self.build(definition)?;
        let mut writer = BufWriter::new(File::create(output)?);
        serde_json::to_writer(&mut writer, &spec).map_err(|e| CompileError::backend(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }
}

fn artifact_type(name: &str) -> Value {
    json!({ "artifactType": { "schemaTitle": format!("tfx.{}", name) } })
}

// Strings stay bare; everything else is carried as its JSON text.
fn parameter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
