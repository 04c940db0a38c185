//! Error types for the pipeline compiler

use std::path::PathBuf;
use pipeline_graph::GraphError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompileError>;

/// Failure to resolve a function reference to a callable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Module not found: '{module}'")]
    ModuleNotFound { module: String },

    #[error("Function '{function}' not found in module '{module}'")]
    AttributeNotFound { module: String, function: String },
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error in {}: {message}", .file.display())]
    Config { file: PathBuf, message: String },

    #[error("Missing required field: [{0}]")]
    MissingField(String),

    #[error("Invalid value for {field}: [{value}]")]
    InvalidValue { field: String, value: String },

    #[error("Invalid function reference format: [{0}]. Expected format: 'module_path.function_name'.")]
    InvalidReferenceFormat(String),

    #[error("Failed to load pipeline function: {0}")]
    Load(#[from] LoadError),

    #[error("Pipeline function '{reference}' failed: {message}")]
    PipelineFunction { reference: String, message: String },

    #[error("Found more than one producer node with a 'model' output ({}), aborting", .0.join(", "))]
    MultipleProducers(Vec<String>),

    #[error("Found more than one node with a 'blessing' output ({}), aborting", .0.join(", "))]
    MultipleBlessors(Vec<String>),

    #[error("Invalid component graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Unsupported output format for {}: expected one of .json, .yaml, .yml", .file.display())]
    UnsupportedFormat { file: PathBuf },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Manifest error in {}: {message}", .file.display())]
    Manifest { file: PathBuf, message: String },
}

impl CompileError {
    pub fn config(file: impl Into<PathBuf>, message: impl ToString) -> Self {
        CompileError::Config {
            file: file.into(),
            message: message.to_string(),
        }
    }

    pub fn manifest(file: impl Into<PathBuf>, message: impl ToString) -> Self {
        CompileError::Manifest {
            file: file.into(),
            message: message.to_string(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        CompileError::Backend(message.into())
    }

    pub fn missing(field: impl Into<String>) -> Self {
        CompileError::MissingField(field.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format_message_names_shape() {
        let err = CompileError::InvalidReferenceFormat("function".into());
        assert_eq!(
            err.to_string(),
            "Invalid function reference format: [function]. Expected format: 'module_path.function_name'."
        );
    }

    #[test]
    fn test_unsupported_format_message_names_file() {
        let err = CompileError::UnsupportedFormat { file: "out/pipeline.txt".into() };
        let message = err.to_string();
        assert!(message.contains("out/pipeline.txt"));
        assert!(message.contains(".json, .yaml, .yml"));
    }
}
