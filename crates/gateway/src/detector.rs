use crate::{error::ApiError, uploads::StagedUpload};
use inference::{BatchReport, DetectionPipeline, InferenceBackend, SingleReport};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

pub type SharedPipeline = DetectionPipeline<Box<dyn InferenceBackend>>;

struct DetectMetrics {
    duration: Histogram<f64>,
    images: Counter<u64>,
    subjects: Counter<u64>,
    item_errors: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> DetectMetrics {
    let meter = global::meter(meter_name);
    let latency_buckets = [
        0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];
    DetectMetrics {
        duration: meter
            .f64_histogram("detect_request_duration_seconds")
            .with_description("Time spent in the detection pipeline per request")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build(),
        images: meter
            .u64_counter("detect_images_total")
            .with_description("Total images submitted for detection")
            .build(),
        subjects: meter
            .u64_counter("detect_images_with_subject_total")
            .with_description("Images with at least one detection above threshold")
            .build(),
        item_errors: meter
            .u64_counter("detect_item_errors_total")
            .with_description("Images that failed to decode or infer")
            .build(),
    }
}

/// Process-wide handle to the loaded model.
///
/// The pipeline runs on the blocking pool behind a mutex; `permits` bounds
/// how many blocking tasks may be in flight. The timeout covers both waiting
/// for a permit and the backend call.
pub struct Detector {
    pipeline: Arc<Mutex<SharedPipeline>>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    metrics: DetectMetrics,
}

impl Detector {
    pub fn new(
        backend: Box<dyn InferenceBackend>,
        labels: Vec<String>,
        max_pending_requests: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            pipeline: Arc::new(Mutex::new(DetectionPipeline::new(backend, labels))),
            permits: Arc::new(Semaphore::new(max_pending_requests)),
            timeout,
            metrics: init_metrics("gateway"),
        }
    }

    /// Staged files are dropped, and so removed, once the pipeline finishes.
    pub async fn detect_batch(&self, uploads: Vec<StagedUpload>) -> Result<BatchReport, ApiError> {
        let start = Instant::now();
        let report = self
            .run_blocking(move |pipeline| pipeline.run_batch(&uploads))
            .await?;

        let attrs = [KeyValue::new("mode", "batch")];
        self.metrics
            .duration
            .record(start.elapsed().as_secs_f64(), &attrs);
        self.metrics
            .images
            .add(report.total_processed as u64, &attrs);
        self.metrics
            .subjects
            .add(report.subjects_found as u64, &attrs);
        self.metrics
            .item_errors
            .add(report.error_count() as u64, &attrs);

        Ok(report)
    }

    pub async fn detect_single(&self, upload: StagedUpload) -> Result<SingleReport, ApiError> {
        let start = Instant::now();
        let attrs = [KeyValue::new("mode", "single")];

        let outcome = self
            .run_blocking(move |pipeline| pipeline.run_single(&upload))
            .await?;

        self.metrics
            .duration
            .record(start.elapsed().as_secs_f64(), &attrs);
        self.metrics.images.add(1, &attrs);

        match outcome {
            Ok(report) => {
                if report.has_subject {
                    self.metrics.subjects.add(1, &attrs);
                }
                Ok(report)
            }
            Err(e) => {
                self.metrics.item_errors.add(1, &attrs);
                Err(ApiError::Processing(e.to_string()))
            }
        }
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut SharedPipeline) -> T + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let pipeline = Arc::clone(&self.pipeline);

        let run = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ApiError::Internal("Detector is shutting down".to_string()))?;

            tokio::task::spawn_blocking(move || {
                // Held until the work ends, even if the caller has timed out
                let _permit = permit;
                let mut guard = match pipeline.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => {
                        tracing::warn!("Detection pipeline lock poisoned by an earlier panic");
                        poisoned.into_inner()
                    }
                };
                work(&mut guard)
            })
            .await
            .map_err(|e| ApiError::Internal(format!("Detection task failed: {}", e)))
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Detection timed out");
                Err(ApiError::Timeout(self.timeout))
            }
        }
    }
}
