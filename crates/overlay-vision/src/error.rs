use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    /// Structural problem with the call's inputs; nothing was drawn.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("read labels {path}: {source}")]
    LabelsIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl VisionError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;
