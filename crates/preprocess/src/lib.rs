pub mod config;
pub mod cpu;

use image::RgbImage;
use ndarray::{Array, Axis, IxDyn};

pub use config::DEFAULT_INPUT_SIZE;
pub use cpu::CpuPreProcessor;

/// Result of preprocessing including transformation parameters
#[derive(Debug)]
pub struct PreprocessResult {
    /// CHW tensor with a leading batch axis of 1, values in [0, 1]
    pub data: Array<f32, IxDyn>,
    /// Scale factor applied during letterboxing
    pub scale: f32,
    /// X offset from letterboxing (in pixels)
    pub offset_x: f32,
    /// Y offset from letterboxing (in pixels)
    pub offset_y: f32,
    /// Width of the source image before letterboxing
    pub orig_width: u32,
    /// Height of the source image before letterboxing
    pub orig_height: u32,
}

/// Trait for image preprocessing implementations
pub trait Preprocess {
    /// Letterbox an RGB image into the model input tensor
    fn preprocess(&mut self, image: &RgbImage) -> anyhow::Result<PreprocessResult>;

    /// Get the input size this preprocessor targets
    fn input_size(&self) -> (u32, u32);
}

/// Concatenate `[1, 3, H, W]` tensors into a single `[N, 3, H, W]` batch.
pub fn stack_batch(items: &[PreprocessResult]) -> anyhow::Result<Array<f32, IxDyn>> {
    if items.is_empty() {
        anyhow::bail!("Cannot build a batch from zero images");
    }

    let views: Vec<_> = items.iter().map(|item| item.data.view()).collect();
    Ok(ndarray::concatenate(Axis(0), &views)?)
}
