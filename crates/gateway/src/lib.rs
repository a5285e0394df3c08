pub mod config;
pub mod detector;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;
pub mod uploads;

pub use detector::Detector;
pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, ModelInfo};
pub use uploads::{StagedUpload, UploadDir};
