// Preview error taxonomy — every failure the session can surface or swallow.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    /// No credential could be produced for the request at all.
    #[error("bad access credential: {0}")]
    BadCredential(&'static str),

    /// The resolver returned a map that does not cover a requested file.
    #[error("missing access token for file {0}")]
    MissingToken(String),

    /// Metadata fetch kept failing until the retry ceiling was hit.
    #[error("could not refresh file {file_id} after {attempts} attempts")]
    RetriesExhausted { file_id: String, attempts: u32 },

    /// The descriptor lacks the permission required for the attempted action.
    #[error("file {0} cannot be previewed")]
    PermissionDenied(String),

    /// No registered loader claims the file's extension.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    /// The active renderer reported a runtime failure.
    #[error("renderer failed: {0}")]
    Renderer(String),

    /// Transient network / collaborator failure.
    #[error(transparent)]
    Fetch(#[from] anyhow::Error),
}

impl PreviewError {
    /// Stable machine-readable code, emitted alongside error events.
    pub fn code(&self) -> &'static str {
        match self {
            PreviewError::BadCredential(_) => "bad_credential",
            PreviewError::MissingToken(_) => "missing_token",
            PreviewError::RetriesExhausted { .. } => "retries_exhausted",
            PreviewError::PermissionDenied(_) => "permission_denied",
            PreviewError::UnsupportedType(_) => "unsupported_type",
            PreviewError::Renderer(_) => "renderer_error",
            PreviewError::Fetch(_) => "fetch_error",
        }
    }

    /// Human-readable message for the error surface. Falls back to a generic
    /// message for errors that carry no user-appropriate detail.
    pub fn display_message(&self) -> String {
        match self {
            PreviewError::PermissionDenied(_) => {
                "You don't have permission to preview this file.".to_string()
            }
            PreviewError::UnsupportedType(ext) => {
                format!("Previews of .{} files are not supported.", ext)
            }
            PreviewError::RetriesExhausted { .. } => {
                "This preview didn't load. Please refresh and try again.".to_string()
            }
            _ => "We're sorry, the preview didn't load.".to_string(),
        }
    }
}
