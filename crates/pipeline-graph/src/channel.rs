//! Artifact handles passed between nodes.

use serde::Serialize;

/// Handle to the artifact produced by one output port of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Id of the node that produces the artifact.
    pub producer: String,
    /// Output port name on the producing node.
    pub output: String,
    /// Artifact type name (e.g. `Model`, `ModelBlessing`).
    pub artifact_type: String,
}

impl Channel {
    pub fn new(
        producer: impl Into<String>,
        output: impl Into<String>,
        artifact_type: impl Into<String>,
    ) -> Self {
        Self {
            producer: producer.into(),
            output: output.into(),
            artifact_type: artifact_type.into(),
        }
    }
}
