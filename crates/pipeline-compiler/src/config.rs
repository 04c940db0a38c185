//! Pipeline and provider configuration
//!
//! A compile is driven by two documents: the pipeline document (name, image,
//! environment, framework parameters) and an optional provider document
//! (execution mode, storage root, default engine arguments). [`resolve`]
//! folds them into one [`Settings`] record without touching the filesystem.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::args::{ArgumentMultimap, NamedArg, scalar_string};
use crate::error::{CompileError, Result};

const SERVING_DIR: &str = "serving";
const TEMP_DIR: &str = "tmp";

/// Engine argument pointing at the scratch location, added unless a layer sets it.
pub const TEMP_LOCATION_ARG: &str = "temp_location";

/// An environment variable entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The pipeline document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Possibly namespaced pipeline name, e.g. `team/penguin`.
    pub name: Option<String>,
    pub image: Option<String>,
    /// Storage base used when no provider document is given.
    pub root_location: Option<String>,
    pub env: Vec<NamedValue>,
    pub framework: Framework,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Framework {
    pub name: Option<String>,
    pub parameters: FrameworkParameters,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrameworkParameters {
    /// Reference to the graph-building function (`module.path.function`).
    pub components: Option<String>,
    /// Alternative spelling of `components`.
    pub pipeline: Option<String>,
    pub beam_args: Vec<NamedArg>,
}

impl FrameworkParameters {
    pub fn function_reference(&self) -> Option<&str> {
        self.components.as_deref().or(self.pipeline.as_deref())
    }
}

/// The provider document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: Option<String>,
    pub execution_mode: Option<String>,
    pub pipeline_root_storage: Option<String>,
    pub default_beam_args: Vec<NamedArg>,
}

/// Manifest schema family to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Workflow document, written as produced.
    #[default]
    V1,
    /// Pipeline spec, wrapped in a job envelope.
    V2,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::V1 => "v1",
            ExecutionMode::V2 => "v2",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "v1" => Ok(ExecutionMode::V1),
            "v2" => Ok(ExecutionMode::V2),
            _ => Err(CompileError::InvalidValue {
                field: "executionMode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Everything a single compile needs, resolved from the configuration documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub name: String,
    /// `name` with every `/` replaced by `-`.
    pub sanitized_name: String,
    /// `<storage base>/<sanitized name>`.
    pub root_storage: String,
    pub serving_directory: String,
    pub temp_directory: String,
    pub image: String,
    pub execution_mode: ExecutionMode,
    pub environment: Vec<NamedValue>,
    pub engine_args: ArgumentMultimap,
    pub function_reference: String,
}

/// Make a namespaced pipeline name safe for use as a path segment.
pub fn sanitize_name(raw: &str) -> String {
    raw.replace('/', "-")
}

/// Fold the pipeline document and optional provider document into [`Settings`].
///
/// Storage paths are always joined with the sanitized name.
pub fn resolve(pipeline: &PipelineConfig, provider: Option<&ProviderConfig>) -> Result<Settings> {
    let name = pipeline.name.clone().ok_or_else(|| CompileError::missing("name"))?;
    let sanitized_name = sanitize_name(&name);

    let function_reference = pipeline
        .framework
        .parameters
        .function_reference()
        .ok_or_else(|| CompileError::missing("framework.parameters.components"))?
        .to_string();

    let (base, execution_mode, defaults) = match provider {
        Some(provider) => {
            let base = provider
                .pipeline_root_storage
                .as_deref()
                .ok_or_else(|| CompileError::missing("pipelineRootStorage"))?;
            let mode = match provider.execution_mode.as_deref() {
                Some(mode) => mode.parse::<ExecutionMode>()?,
                None => ExecutionMode::default(),
            };
            (Some(base), mode, ArgumentMultimap::from_named(&provider.default_beam_args))
        }
        None => (
            pipeline.root_location.as_deref(),
            ExecutionMode::default(),
            ArgumentMultimap::new(),
        ),
    };

    let root_storage = match base {
        Some(base) => join(base, &sanitized_name),
        None => sanitized_name.clone(),
    };
    let serving_directory = join(&root_storage, SERVING_DIR);
    let temp_directory = join(&root_storage, TEMP_DIR);

    let overrides = ArgumentMultimap::from_named(&pipeline.framework.parameters.beam_args);
    let mut engine_args = ArgumentMultimap::merge([&defaults, &overrides]);
    if !engine_args.contains_key(TEMP_LOCATION_ARG) {
        engine_args.push(TEMP_LOCATION_ARG, temp_directory.clone());
    }

    Ok(Settings {
        name,
        sanitized_name,
        root_storage,
        serving_directory,
        temp_directory,
        image: pipeline.image.clone().unwrap_or_default(),
        execution_mode,
        environment: pipeline.env.clone(),
        engine_args,
        function_reference,
    })
}

// Joins with a single `/`, dropping trailing slashes from `base`.
fn join(base: &str, segment: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), segment)
}

pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    read_document(path)
}

pub fn load_provider_config(path: &Path) -> Result<ProviderConfig> {
    read_document(path)
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(CompileError::config(path, "file not found"));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| CompileError::config(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pipeline(yaml: &str) -> PipelineConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn provider(yaml: &str) -> ProviderConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    const PIPELINE: &str = r#"
name: namespace/test
image: pipeline-image:latest
env:
  - name: a
    value: aVal
framework:
  name: tfx
  parameters:
    components: penguin_pipeline.pipeline.create_components
    beamArgs:
      - name: runner
        value: DataflowRunner
"#;

    const PROVIDER: &str = r#"
name: kfp
executionMode: v2
pipelineRootStorage: gs://bucket/pipelines
defaultBeamArgs:
  - name: runner
    value: DirectRunner
  - name: project
    value: my-project
"#;

    #[test]
    fn test_sanitize_name() {
        let cases = [
            ("namespace/name", "namespace-name"),
            ("test", "test"),
            ("/", "-"),
            ("a/b/c/d/e/f/g/h/", "a-b-c-d-e-f-g-h-"),
            ("", ""),
        ];
        for (input, expected) in cases {
            assert_eq!(sanitize_name(input), expected, "sanitizing {:?}", input);
        }
    }

    #[test]
    fn test_resolve_with_provider() {
        let settings = resolve(&pipeline(PIPELINE), Some(&provider(PROVIDER))).unwrap();

        assert_eq!(settings.name, "namespace/test");
        assert_eq!(settings.sanitized_name, "namespace-test");
        assert_eq!(settings.root_storage, "gs://bucket/pipelines/namespace-test");
        assert_eq!(settings.serving_directory, "gs://bucket/pipelines/namespace-test/serving");
        assert_eq!(settings.temp_directory, "gs://bucket/pipelines/namespace-test/tmp");
        assert_eq!(settings.image, "pipeline-image:latest");
        assert_eq!(settings.execution_mode, ExecutionMode::V2);
        assert_eq!(settings.environment, vec![NamedValue::new("a", "aVal")]);
        assert_eq!(settings.function_reference, "penguin_pipeline.pipeline.create_components");
        assert_eq!(
            settings.engine_args.to_flags(),
            vec![
                "--runner=DirectRunner",
                "--runner=DataflowRunner",
                "--project=my-project",
                "--temp_location=gs://bucket/pipelines/namespace-test/tmp",
            ]
        );
    }

    #[test]
    fn test_root_join() {
        let pipeline = pipeline("name: pipeline\nframework: {parameters: {components: m.f}}");
        let provider = provider("pipelineRootStorage: storage/");
        let settings = resolve(&pipeline, Some(&provider)).unwrap();
        assert_eq!(settings.root_storage, "storage/pipeline");
        assert_eq!(settings.execution_mode, ExecutionMode::V1);
    }

    #[test]
    fn test_user_temp_location_kept() {
        let pipeline = pipeline(
            r#"
name: p
framework:
  parameters:
    pipeline: m.f
    beamArgs:
      - name: temp_location
        value: gs://scratch
"#,
        );
        let settings = resolve(&pipeline, None).unwrap();
        assert_eq!(settings.engine_args.get(TEMP_LOCATION_ARG).unwrap(), ["gs://scratch"]);
        assert_eq!(settings.function_reference, "m.f");
    }

    #[test]
    fn test_without_provider() {
        let settings = resolve(&pipeline("name: ns/p\nframework: {parameters: {components: m.f}}"), None).unwrap();
        assert_eq!(settings.root_storage, "ns-p");
        assert_eq!(settings.serving_directory, "ns-p/serving");
        assert_eq!(settings.execution_mode, ExecutionMode::V1);
        assert_eq!(settings.image, "");

        let legacy = pipeline("name: ns/p\nrootLocation: /mnt/pipelines\nframework: {parameters: {components: m.f}}");
        let settings = resolve(&legacy, None).unwrap();
        assert_eq!(settings.root_storage, "/mnt/pipelines/ns-p");
    }

    #[test]
    fn test_missing_name() {
        let err = resolve(&pipeline("framework: {parameters: {components: m.f}}"), None).unwrap_err();
        assert!(matches!(err, CompileError::MissingField(ref f) if f == "name"));
    }

    #[test]
    fn test_missing_root_storage() {
        let err = resolve(&pipeline(PIPELINE), Some(&provider("executionMode: v1"))).unwrap_err();
        assert!(matches!(err, CompileError::MissingField(ref f) if f == "pipelineRootStorage"));
    }

    #[test]
    fn test_missing_function_reference() {
        let err = resolve(&pipeline("name: p"), None).unwrap_err();
        assert!(matches!(err, CompileError::MissingField(_)));
    }

    #[test]
    fn test_execution_mode_parse() {
        assert_eq!("V2".parse::<ExecutionMode>().unwrap(), ExecutionMode::V2);
        assert_eq!("v1".parse::<ExecutionMode>().unwrap(), ExecutionMode::V1);
        assert!(matches!(
            "v3".parse::<ExecutionMode>(),
            Err(CompileError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_numeric_env_value() {
        let config = pipeline("name: p\nenv:\n  - name: RETRIES\n    value: 3\n");
        assert_eq!(config.env, vec![NamedValue::new("RETRIES", "3")]);
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(raw in "[a-z/._-]{0,16}") {
            let once = sanitize_name(&raw);
            prop_assert!(!once.contains('/'));
            prop_assert_eq!(sanitize_name(&once), once.clone());
            prop_assert_eq!(once.len(), raw.len());
        }
    }
}
