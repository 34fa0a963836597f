use std::path::PathBuf;

use super::shader::ShaderStage;

/// Failures raised by the rendering core.
///
/// None of these abort a frame: the component that hits one logs it at `error`
/// level and carries on with whatever it can still draw. They are also returned
/// so callers that care can react to them.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("{stage} stage failed to compile ({}): {message}", .path.display())]
    Compile {
        stage: ShaderStage,
        path: PathBuf,
        message: String,
    },

    #[error("program failed to link: {message}")]
    Link { message: String },

    #[error("unsupported model format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("malformed mesh {}: {source}", .path.display())]
    Mesh {
        path: PathBuf,
        #[source]
        source: crate::mesh::MeshError,
    },

    #[error("missing resource: {0}")]
    MissingResource(String),

    #[error("{0} used before it was configured")]
    UninitializedCollaborator(&'static str),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub(crate) fn missing(what: impl Into<String>) -> Self {
        Self::MissingResource(what.into())
    }
}
