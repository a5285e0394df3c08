use crate::{detector::Detector, uploads::UploadDir};
use std::sync::Arc;

/// What `/health` reports about the loaded checkpoint.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub path: String,
    pub loaded: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<Detector>,
    pub uploads: Arc<UploadDir>,
    pub model: Arc<ModelInfo>,
}

impl AppState {
    pub fn new(detector: Detector, uploads: UploadDir, model: ModelInfo) -> Self {
        Self {
            detector: Arc::new(detector),
            uploads: Arc::new(uploads),
            model: Arc::new(model),
        }
    }
}
