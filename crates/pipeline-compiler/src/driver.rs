//! Compiler driver that runs a compile end to end

use std::path::PathBuf;

use crate::args::ArgumentMultimap;
use crate::backend::{self, GraphCompiler};
use crate::config::{self, ExecutionMode, Settings};
use crate::error::Result;
use crate::expander::{self, Expansion};
use crate::loader::{self, FunctionResolver};
use crate::manifest::{self, OutputFormat};

/// Result of a successful compile
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Manifest file that was written
    pub output_file: PathBuf,
    pub format: OutputFormat,
    pub execution_mode: ExecutionMode,
    /// Sanitized pipeline name
    pub pipeline_name: String,
    /// Whether a deployment node was added to the graph
    pub expansion: Expansion,
    /// Nodes in the compiled graph, deployment node included
    pub node_count: usize,
    /// Engine arguments passed through to the backend
    pub engine_args: ArgumentMultimap,
}

/// Options for compilation
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Pipeline configuration document
    pub pipeline_config: PathBuf,
    /// Provider configuration document (optional)
    pub provider_config: Option<PathBuf>,
    /// Manifest destination; the extension selects the format
    pub output_file: PathBuf,
    /// Overrides the provider's execution mode
    pub execution_mode: Option<ExecutionMode>,
}

impl CompileOptions {
    pub fn new(pipeline_config: impl Into<PathBuf>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            pipeline_config: pipeline_config.into(),
            provider_config: None,
            output_file: output_file.into(),
            execution_mode: None,
        }
    }

    pub fn provider_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.provider_config = Some(path.into());
        self
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }
}

/// The pipeline compiler
pub struct Compiler<R: FunctionResolver> {
    options: CompileOptions,
    resolver: R,
    backend: Option<Box<dyn GraphCompiler>>,
}

impl<R: FunctionResolver> Compiler<R> {
    /// Create a compiler that resolves graph-building functions through `resolver`
    pub fn new(options: CompileOptions, resolver: R) -> Self {
        Self {
            options,
            resolver,
            backend: None,
        }
    }

    /// Use `backend` instead of the one matching the execution mode
    pub fn with_backend(mut self, backend: Box<dyn GraphCompiler>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Resolve the configuration documents into settings
    pub fn settings(&self) -> Result<Settings> {
        let pipeline = config::load_pipeline_config(&self.options.pipeline_config)?;
        let provider = match &self.options.provider_config {
            Some(path) => Some(config::load_provider_config(path)?),
            None => None,
        };

        let mut settings = config::resolve(&pipeline, provider.as_ref())?;
        if let Some(mode) = self.options.execution_mode {
            settings.execution_mode = mode;
        }
        Ok(settings)
    }

    /// Run the full compilation pipeline and write the manifest
    pub fn compile(&self) -> Result<CompileOutput> {
        let output_file = &self.options.output_file;
        let format = OutputFormat::from_path(output_file)?;

        let settings = self.settings()?;
        tracing::info!(
            pipeline = %settings.name,
            mode = %settings.execution_mode,
            root = %settings.root_storage,
            "Compiling pipeline"
        );
        tracing::debug!(args = ?settings.engine_args, "Merged engine arguments");

        // The environment is restored when `loaded` goes out of scope.
        let nodes = {
            let loaded = loader::load(&self.resolver, &settings.function_reference, &settings.environment)?;
            loaded.call()?
        };

        let expanded = expander::expand(&nodes, &settings.serving_directory)?;

        let default_backend;
        let backend: &dyn GraphCompiler = match &self.backend {
            Some(backend) => backend.as_ref(),
            None => {
                default_backend = backend::for_mode(settings.execution_mode);
                default_backend.as_ref()
            }
        };

        let document = manifest::compile(backend, &settings, &expanded.nodes, &settings.engine_args.to_flags())?;
        manifest::write_atomic(&document, output_file, format)?;

        tracing::info!("{} written", output_file.display());

        Ok(CompileOutput {
            output_file: output_file.clone(),
            format,
            execution_mode: settings.execution_mode,
            pipeline_name: settings.sanitized_name,
            expansion: expanded.outcome,
            node_count: expanded.nodes.len(),
            engine_args: settings.engine_args,
        })
    }
}
