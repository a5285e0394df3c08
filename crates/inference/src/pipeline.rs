use crate::{
    backend::InferenceBackend,
    error::{ItemError, PipelineError},
    source::{ImageSource, decode_rgb},
    types::{BatchReport, DetectionCandidate, FilteredDetection, ImageResult, SingleReport},
};
use common::span;
use image::RgbImage;

/// Detections must score strictly above this to be reported.
pub const CONFIDENCE_THRESHOLD: f32 = 0.3;

/// Images per backend call in batch mode.
pub const GROUP_SIZE: usize = 8;

type ItemOutcome = Result<Vec<FilteredDetection>, ItemError>;

pub struct DetectionPipeline<B: InferenceBackend> {
    backend: B,
    labels: Vec<String>,
}

impl<B: InferenceBackend> DetectionPipeline<B> {
    pub fn new(backend: B, labels: Vec<String>) -> Self {
        Self { backend, labels }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run detection over every source, one backend call per group.
    ///
    /// Always yields exactly one result per source, in input order. Decode
    /// failures are recorded per image; a backend failure marks every image
    /// of that group as failed.
    pub fn run_batch<S: ImageSource>(&mut self, sources: &[S]) -> BatchReport {
        let _span = tracing::info_span!("detect_batch", images = sources.len()).entered();

        let total = sources.len();
        let mut outcomes: Vec<Option<ItemOutcome>> = vec![None; total];
        let mut group: Vec<(usize, RgbImage)> = Vec::with_capacity(GROUP_SIZE);

        for (idx, source) in sources.iter().enumerate() {
            match decode_rgb(source) {
                Ok(image) => group.push((idx, image)),
                Err(e) => {
                    tracing::warn!(
                        filename = source.display_name(),
                        error = %e,
                        "Failed to decode image"
                    );
                    outcomes[idx] = Some(Err(ItemError::Decode(e.to_string())));
                }
            }

            let is_last = idx + 1 == total;
            if !group.is_empty() && (group.len() == GROUP_SIZE || is_last) {
                self.flush_group(&mut group, &mut outcomes);
                tracing::debug!(processed = idx + 1, total, "Group processed");
            }
        }

        let results: Vec<ImageResult> = sources
            .iter()
            .zip(outcomes)
            .map(|(source, outcome)| {
                ImageResult::from_outcome(
                    source.display_name(),
                    outcome.unwrap_or(Err(ItemError::NotProcessed)),
                )
            })
            .collect();

        let report = BatchReport::from_results(results);
        tracing::info!(
            total_processed = report.total_processed,
            subjects_found = report.subjects_found,
            errors = report.error_count(),
            "Batch processing complete"
        );
        report
    }

    /// Run detection on one image.
    pub fn run_single<S: ImageSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<SingleReport, PipelineError> {
        let _span =
            tracing::info_span!("detect_single", filename = source.display_name()).entered();

        let image = decode_rgb(source)?;
        let mut per_image = self.infer(std::slice::from_ref(&image))?;
        let detections = per_image.pop().unwrap_or_default();

        let report = SingleReport::from_detections(detections);
        tracing::info!(
            has_subject = report.has_subject,
            detections = report.detections.len(),
            "Single image processed"
        );
        Ok(report)
    }

    fn flush_group(
        &mut self,
        group: &mut Vec<(usize, RgbImage)>,
        outcomes: &mut [Option<ItemOutcome>],
    ) {
        let _s = span!("flush_group");
        let (indices, images): (Vec<usize>, Vec<RgbImage>) = group.drain(..).unzip();

        match self.infer(&images) {
            Ok(per_image) => {
                for (idx, detections) in indices.into_iter().zip(per_image) {
                    outcomes[idx] = Some(Ok(detections));
                }
            }
            Err(e) => {
                tracing::error!(group_size = indices.len(), error = %e, "Group inference failed");
                let item_error = ItemError::from(e);
                for idx in indices {
                    outcomes[idx] = Some(Err(item_error.clone()));
                }
            }
        }
    }

    /// One backend call, then the confidence filter for each image.
    fn infer(&mut self, images: &[RgbImage]) -> Result<Vec<Vec<FilteredDetection>>, PipelineError> {
        let raw = self.backend.infer(images).map_err(PipelineError::Backend)?;

        if raw.len() != images.len() {
            return Err(PipelineError::OutputMismatch {
                expected: images.len(),
                got: raw.len(),
            });
        }

        Ok(raw
            .into_iter()
            .map(|candidates| filter_candidates(candidates, &self.labels))
            .collect())
    }
}

/// Keep candidates scoring strictly above [`CONFIDENCE_THRESHOLD`].
pub fn filter_candidates(
    candidates: Vec<DetectionCandidate>,
    labels: &[String],
) -> Vec<FilteredDetection> {
    candidates
        .into_iter()
        .filter(|c| c.confidence > CONFIDENCE_THRESHOLD)
        .map(|c| FilteredDetection {
            confidence: c.confidence,
            label: label_for(labels, c.class_id),
            bbox: Some(c.bbox),
        })
        .collect()
}

fn label_for(labels: &[String], class_id: u32) -> String {
    labels
        .get(class_id as usize)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id))
}
