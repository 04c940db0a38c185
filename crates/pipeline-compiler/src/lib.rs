//! Pipeline compiler
//!
//! Turns a pipeline configuration and an optional provider configuration
//! into a workflow manifest. The component graph comes from a
//! graph-building function named in the configuration; a deployment node is
//! added when the graph has none.

pub mod args;
pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod expander;
pub mod loader;
pub mod manifest;

pub use args::{ArgValue, ArgumentMultimap, NamedArg};
pub use backend::{GraphCompiler, PipelineDefinition, PipelineSpecBackend, WorkflowBackend};
pub use config::{ExecutionMode, NamedValue, PipelineConfig, ProviderConfig, Settings};
pub use driver::{CompileOptions, CompileOutput, Compiler};
pub use error::{CompileError, LoadError, Result};
pub use expander::{ExpandedGraph, Expansion};
pub use loader::{FunctionResolver, LoadedPipeline, ModuleRegistry, PipelineFn, builtin_registry};
pub use manifest::{OutputFormat, PipelineJob};
