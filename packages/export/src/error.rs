use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported render format: {0}")]
    UnsupportedFormat(String),

    #[error("encoding export: {0}")]
    Json(#[from] serde_json::Error),

    #[error("writing archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("graphviz renderer is not installed")]
    RendererUnavailable,

    #[error("graphviz rendering timed out after {0:?}")]
    RenderTimeout(Duration),

    #[error("graphviz rendering failed: {0}")]
    RenderFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;
