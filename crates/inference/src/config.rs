use serde::Deserialize;
use std::path::PathBuf;

pub use preprocess::DEFAULT_INPUT_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

/// Settings for loading and driving the detection model.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub model_path: PathBuf,
    pub input_size: (u32, u32),
    pub input_name: String,
    pub output_name: String,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
    /// Model accepts a dynamic batch axis; otherwise images run one by one
    pub dynamic_batch: bool,
    /// Candidates at or below this score are pruned before NMS
    pub nms_score_floor: f32,
    pub iou_threshold: f32,
}
