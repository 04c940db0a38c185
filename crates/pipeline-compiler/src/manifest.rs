//! Manifest assembly and output
//!
//! The backend's native output is parsed back into a structure, wrapped in
//! a job envelope for the pipeline-spec family, and written in the format
//! the output file's extension asks for. Writes go through a temporary file
//! in the destination directory, so either the whole manifest lands or
//! nothing does.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use pipeline_graph::{ComponentNode, topological_order};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::backend::{GraphCompiler, PipelineDefinition};
use crate::config::{ExecutionMode, Settings};
use crate::error::{CompileError, Result};

/// Serialization format of a manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON, two-space indent.
    Json,
    /// Block-style YAML.
    Yaml,
}

impl OutputFormat {
    /// Pick the format from the file extension: `.json`, `.yaml` or `.yml`.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(OutputFormat::Json),
            Some("yaml") | Some("yml") => Ok(OutputFormat::Yaml),
            _ => Err(CompileError::UnsupportedFormat {
                file: path.to_path_buf(),
            }),
        }
    }
}

/// Envelope around a pipeline spec.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineJob {
    pub display_name: String,
    pub labels: BTreeMap<String, String>,
    pub pipeline_spec: Value,
    pub runtime_config: Map<String, Value>,
}

impl PipelineJob {
    pub fn wrap(pipeline_spec: Value, display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            labels: BTreeMap::new(),
            pipeline_spec,
            runtime_config: Map::new(),
        }
    }
}

/// Compile `nodes` into the final manifest document for `settings.execution_mode`.
///
/// The graph is validated and ordered first. The backend writes into a
/// scratch directory which is removed before this returns.
pub fn compile(
    backend: &dyn GraphCompiler,
    settings: &Settings,
    nodes: &[ComponentNode],
    engine_args: &[String],
) -> Result<Value> {
    let ordered: Vec<ComponentNode> = topological_order(nodes)?.into_iter().cloned().collect();

    let definition = PipelineDefinition {
        name: settings.sanitized_name.clone(),
        display_name: settings.name.clone(),
        root: settings.root_storage.clone(),
        image: settings.image.clone(),
        nodes: ordered,
        engine_args: engine_args.to_vec(),
        enable_cache: false,
    };

    let scratch = tempfile::tempdir()?;
    let native = scratch.path().join(backend.output_file_name());
    backend.compile_graph(&definition, &native)?;
    let raw = read_native(&native)?;

    tracing::debug!(path = %native.display(), "Parsed backend output");

    match settings.execution_mode {
        ExecutionMode::V1 => Ok(raw),
        ExecutionMode::V2 => {
            let job = PipelineJob::wrap(raw, settings.sanitized_name.clone());
            serde_json::to_value(job).map_err(|e| CompileError::manifest(&native, e))
        }
    }
}

/// Parse a manifest file according to its extension.
pub fn read_native(path: &Path) -> Result<Value> {
    let format = OutputFormat::from_path(path)?;
    let reader = BufReader::new(File::open(path)?);
    match format {
        OutputFormat::Json => serde_json::from_reader(reader).map_err(|e| CompileError::manifest(path, e)),
        OutputFormat::Yaml => serde_yaml::from_reader(reader).map_err(|e| CompileError::manifest(path, e)),
    }
}

/// Write `document` to `path` atomically.
pub fn write_atomic<T: Serialize>(document: &T, path: &Path, format: OutputFormat) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        match format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut writer, document).map_err(|e| CompileError::manifest(path, e))?;
                writeln!(writer)?;
            }
            OutputFormat::Yaml => {
                serde_yaml::to_writer(&mut writer, document).map_err(|e| CompileError::manifest(path, e))?;
            }
        }
        writer.flush()?;
    }
    set_output_permissions(tmp.as_file(), path)?;

    tmp.persist(path).map_err(|e| CompileError::Io(e.error))?;
    Ok(())
}

/// Keep the mode of an existing target, otherwise use `0o644`. Temporary
/// files start out owner-only.
#[cfg(unix)]
fn set_output_permissions(file: &File, path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match std::fs::metadata(path) {
        Ok(metadata) => metadata.permissions().mode(),
        Err(_) => 0o644,
    };
    file.set_permissions(std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_output_permissions(_file: &File, _path: &Path) -> Result<()> {
    Ok(())
}
