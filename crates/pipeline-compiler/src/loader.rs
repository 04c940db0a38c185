//! Resolution of graph-building functions by reference
//!
//! A reference has the shape `module_path.function_name` and is split on its
//! last `.`. The [`FunctionResolver`] trait isolates how a module path and
//! function name become a callable; [`ModuleRegistry`] is the in-process
//! implementation the CLI uses.
//!
//! Loading also applies the pipeline's environment variables, which is how
//! configuration reaches the graph-building function. The environment is
//! process-global: the variables stay applied for as long as the returned
//! [`LoadedPipeline`] lives and are restored when it is dropped. Two compiles
//! must never run concurrently in one process.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fmt;
use std::sync::Arc;

use pipeline_graph::ComponentNode;

use crate::config::NamedValue;
use crate::error::{CompileError, LoadError, Result};

/// A graph-building function.
pub type PipelineFn = Arc<dyn Fn() -> anyhow::Result<Vec<ComponentNode>> + Send + Sync>;

/// Turns a module path and function name into a callable.
pub trait FunctionResolver {
    fn resolve(&self, module_path: &str, function_name: &str) -> std::result::Result<PipelineFn, LoadError>;
}

impl<R: FunctionResolver + ?Sized> FunctionResolver for &R {
    fn resolve(&self, module_path: &str, function_name: &str) -> std::result::Result<PipelineFn, LoadError> {
        (**self).resolve(module_path, function_name)
    }
}

/// Graph-building functions registered by module path.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, BTreeMap<String, PipelineFn>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` as `module_path.function_name`.
    pub fn register<F>(
        &mut self,
        module_path: impl Into<String>,
        function_name: impl Into<String>,
        function: F,
    ) -> &mut Self
    where
        F: Fn() -> anyhow::Result<Vec<ComponentNode>> + Send + Sync + 'static,
    {
        self.modules
            .entry(module_path.into())
            .or_default()
            .insert(function_name.into(), Arc::new(function));
        self
    }

    /// Function names registered under a module, sorted.
    pub fn functions(&self, module_path: &str) -> Option<Vec<&str>> {
        self.modules
            .get(module_path)
            .map(|functions| functions.keys().map(String::as_str).collect())
    }
}

impl FunctionResolver for ModuleRegistry {
    fn resolve(&self, module_path: &str, function_name: &str) -> std::result::Result<PipelineFn, LoadError> {
        let module = self.modules.get(module_path).ok_or_else(|| LoadError::ModuleNotFound {
            module: module_path.to_string(),
        })?;

        tracing::debug!(module = module_path, functions = ?module.keys().collect::<Vec<_>>(), "Loaded module");

        module
            .get(function_name)
            .cloned()
            .ok_or_else(|| LoadError::AttributeNotFound {
                module: module_path.to_string(),
                function: function_name.to_string(),
            })
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort_by(|a, b| a.0.cmp(b.0));
        f.debug_map()
            .entries(modules.into_iter().map(|(path, functions)| (path, functions.keys().collect::<Vec<_>>())))
            .finish()
    }
}

/// Registry with the bundled quickstart pipelines.
pub fn builtin_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry
        .register(
            "penguin_pipeline.pipeline",
            "create_components",
            pipeline_quickstart::create_components,
        )
        .register(
            "penguin_pipeline.pipeline",
            "create_evaluated_components",
            pipeline_quickstart::create_evaluated_components,
        );
    registry
}

/// Split a reference on its last `.` into module path and function name.
pub fn split_reference(reference: &str) -> Result<(&str, &str)> {
    reference
        .rsplit_once('.')
        .ok_or_else(|| CompileError::InvalidReferenceFormat(reference.to_string()))
}

/// Environment variables applied for the lifetime of the guard.
///
/// Later entries with the same name overwrite earlier ones. On drop every
/// touched variable goes back to its prior value, or is removed if it was
/// not set before.
#[derive(Debug)]
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
}

impl EnvGuard {
    pub fn apply(vars: &[NamedValue]) -> Self {
        let mut previous: Vec<(String, Option<OsString>)> = Vec::new();
        for var in vars {
            if !previous.iter().any(|(name, _)| *name == var.name) {
                previous.push((var.name.clone(), std::env::var_os(&var.name)));
            }
            tracing::debug!(name = %var.name, "Setting environment variable");
            // SAFETY: compiles run one per process and nothing else in this
            // crate touches the environment while a guard is alive.
            unsafe { std::env::set_var(&var.name, &var.value) };
        }
        Self { previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, value) in self.previous.drain(..) {
            // SAFETY: see `EnvGuard::apply`.
            unsafe {
                match value {
                    Some(value) => std::env::set_var(&name, value),
                    None => std::env::remove_var(&name),
                }
            }
        }
    }
}

/// A resolved graph-building function with its environment applied.
pub struct LoadedPipeline {
    reference: String,
    function: PipelineFn,
    _env: EnvGuard,
}

impl LoadedPipeline {
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Run the function with the pipeline environment in place.
    pub fn call(&self) -> Result<Vec<ComponentNode>> {
        (self.function)().map_err(|e| CompileError::PipelineFunction {
            reference: self.reference.clone(),
            message: format!("{:#}", e),
        })
    }
}

impl fmt::Debug for LoadedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPipeline")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

/// Resolve `reference` after applying `environment`.
///
/// The reference format is checked before the environment is touched. The
/// function is returned unexecuted.
pub fn load(
    resolver: &dyn FunctionResolver,
    reference: &str,
    environment: &[NamedValue],
) -> Result<LoadedPipeline> {
    let (module_path, function_name) = split_reference(reference)?;

    let env = EnvGuard::apply(environment);
    let function = resolver.resolve(module_path, function_name)?;

    tracing::info!(reference, "Loaded pipeline function");

    Ok(LoadedPipeline {
        reference: reference.to_string(),
        function,
        _env: env,
    })
}
