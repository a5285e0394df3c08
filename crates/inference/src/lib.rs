pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod processing;
pub mod source;
pub mod types;

// Re-export commonly used types for convenience
pub use backend::InferenceBackend;
pub use config::{BackendConfig, ExecutionProvider};
pub use error::{ItemError, PipelineError};
pub use pipeline::{CONFIDENCE_THRESHOLD, DetectionPipeline, GROUP_SIZE};
pub use source::{ImageSource, InMemoryImage};
pub use types::{BatchReport, DetectionCandidate, FilteredDetection, ImageResult, SingleReport};
