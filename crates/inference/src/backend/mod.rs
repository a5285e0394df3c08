use crate::types::DetectionCandidate;
use image::RgbImage;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Seam between the pipeline and a concrete detection library.
///
/// Implementations receive a whole group of decoded images in one call and
/// must return exactly one candidate list per image, in input order.
pub trait InferenceBackend: Send {
    fn infer(&mut self, images: &[RgbImage]) -> anyhow::Result<Vec<Vec<DetectionCandidate>>>;
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn infer(&mut self, images: &[RgbImage]) -> anyhow::Result<Vec<Vec<DetectionCandidate>>> {
        (**self).infer(images)
    }
}
