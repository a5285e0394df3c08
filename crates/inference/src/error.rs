use thiserror::Error;

/// Failure confined to a single image of a batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItemError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Inference failed: {0}")]
    Backend(String),

    #[error("Image was not processed")]
    NotProcessed,
}

/// Failure of the single-image pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Inference failed: {0}")]
    Backend(#[source] anyhow::Error),

    #[error("Backend returned {got} result sets for {expected} images")]
    OutputMismatch { expected: usize, got: usize },
}

impl From<PipelineError> for ItemError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Decode(e) => ItemError::Decode(e.to_string()),
            PipelineError::Backend(e) => ItemError::Backend(format!("{e:#}")),
            mismatch @ PipelineError::OutputMismatch { .. } => {
                ItemError::Backend(mismatch.to_string())
            }
        }
    }
}
