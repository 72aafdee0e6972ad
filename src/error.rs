//! Error types for the glTF to USD bridge.

use crate::geometry::TopologyMode;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for conversion operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Failed to parse JSON data.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to read or process an image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The index count does not fit the primitive's topology mode.
    #[error("{index_count} indices do not form {mode:?} topology")]
    TopologyMismatch {
        mode: TopologyMode,
        index_count: usize,
    },

    /// A required vertex attribute is absent.
    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),

    /// An attribute array is shorter than its interpolation requires.
    #[error("Attribute '{name}' has {actual} elements, expected {expected}")]
    AttributeLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A vertex index points past the end of the vertex arrays.
    #[error("Index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    /// Tangent frames could not be built for a primitive.
    #[error("Tangent generation failed: {0}")]
    Tangent(#[from] crate::geometry::TangentError),

    /// Accessor or buffer data in the source document is malformed.
    #[error("Invalid glTF data: {0}")]
    InvalidGltf(String),

    /// No resolution rule exists for a (type, channel) request.
    #[error("Unresolved channel request: {0}")]
    UnresolvedChannel(String),

    /// No broadcast rule exists between two value types.
    #[error("No default broadcast from {from} to {to}")]
    UnhandledDefaultBroadcast { from: &'static str, to: &'static str },

    /// A shading network has dangling connections, cycles or repeated
    /// color space corrections.
    #[error("Invalid shading graph: {0}")]
    InvalidGraph(String),

    /// Failed to export a conversion result.
    #[error("Export error: {0}")]
    Export(String),
}

impl BridgeError {
    /// Whether this error indicates a gap in the resolution tables rather
    /// than bad input data.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            BridgeError::UnresolvedChannel(_)
                | BridgeError::UnhandledDefaultBroadcast { .. }
                | BridgeError::InvalidGraph(_)
        )
    }
}

/// Whether a diagnostic stems from bad input or from a gap in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    InputData,
    Internal,
}

/// A failure that was recovered from by skipping part of the conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// What was skipped, e.g. `mesh "Body" primitive 2`.
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    /// Classify and log an error. Internal errors are logged at error
    /// level, input errors as warnings.
    pub fn from_error(subject: impl Into<String>, error: &BridgeError) -> Self {
        let subject = subject.into();
        let kind = if error.is_internal() {
            log::error!("{}: {}", subject, error);
            DiagnosticKind::Internal
        } else {
            log::warn!("{}: {}", subject, error);
            DiagnosticKind::InputData
        };
        Self {
            kind,
            subject,
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_classification() {
        assert!(BridgeError::UnresolvedChannel("x".into()).is_internal());
        assert!(BridgeError::UnhandledDefaultBroadcast { from: "color3", to: "vector3" }.is_internal());
        assert!(!BridgeError::MissingAttribute("POSITION").is_internal());
        assert!(!BridgeError::TopologyMismatch {
            mode: TopologyMode::Triangles,
            index_count: 4
        }
        .is_internal());
    }

    #[test]
    fn test_topology_message() {
        let err = BridgeError::TopologyMismatch {
            mode: TopologyMode::Lines,
            index_count: 3,
        };
        assert_eq!(err.to_string(), "3 indices do not form Lines topology");
    }

    #[test]
    fn test_diagnostic_kind() {
        let internal = Diagnostic::from_error("material \"m\"", &BridgeError::InvalidGraph("cycle".into()));
        assert_eq!(internal.kind, DiagnosticKind::Internal);
        assert_eq!(internal.message, "Invalid shading graph: cycle");
        let input = Diagnostic::from_error("mesh", &BridgeError::MissingAttribute("POSITION"));
        assert_eq!(input.kind, DiagnosticKind::InputData);
        assert_eq!(input.subject, "mesh");
    }
}
