use super::InferenceBackend;
use crate::config::{BackendConfig, ExecutionProvider};
use crate::processing::post::{PostProcessor, TransformParams};
use crate::types::DetectionCandidate;
use image::RgbImage;
use ndarray::{Array, ArrayD, Axis, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use preprocess::{CpuPreProcessor, Preprocess, PreprocessResult, stack_batch};

pub struct OrtBackend {
    session: Session,
    preprocessor: CpuPreProcessor,
    postprocessor: PostProcessor,
    config: BackendConfig,
}

impl OrtBackend {
    /// Load the ONNX model once; the session is reused for every request.
    pub fn load_model(config: &BackendConfig) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?;

        let builder = match config.execution_provider {
            #[cfg(feature = "cuda")]
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?
            }
            #[cfg(not(feature = "cuda"))]
            ExecutionProvider::Cuda => {
                anyhow::bail!(
                    "CUDA execution provider requested but the `cuda` feature is disabled"
                );
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
                builder
            }
        };

        let session = builder.commit_from_file(&config.model_path)?;

        tracing::info!(
            model_path = %config.model_path.display(),
            dynamic_batch = config.dynamic_batch,
            "Model loaded"
        );

        Ok(Self {
            session,
            preprocessor: CpuPreProcessor::new(config.input_size),
            postprocessor: PostProcessor::new(config.nms_score_floor, config.iou_threshold),
            config: config.clone(),
        })
    }

    fn run_session(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<ArrayD<f32>> {
        let _infer_span =
            tracing::info_span!("model_inference", batch = input.shape()[0]).entered();

        let outputs = self.session.run(ort::inputs![
            self.config.input_name.as_str() => TensorRef::from_array_view(input.view())?
        ])?;

        let predictions = outputs[self.config.output_name.as_str()].try_extract_array::<f32>()?;
        Ok(predictions.into_owned())
    }

    fn decode(
        &self,
        predictions: &ArrayD<f32>,
        index: usize,
        prepared: &PreprocessResult,
    ) -> anyhow::Result<Vec<DetectionCandidate>> {
        let transform = TransformParams {
            orig_width: prepared.orig_width,
            orig_height: prepared.orig_height,
            scale: prepared.scale,
            offset_x: prepared.offset_x,
            offset_y: prepared.offset_y,
        };
        self.postprocessor
            .parse_detections(&predictions.index_axis(Axis(0), index), &transform)
    }
}

impl InferenceBackend for OrtBackend {
    fn infer(&mut self, images: &[RgbImage]) -> anyhow::Result<Vec<Vec<DetectionCandidate>>> {
        let prepared = images
            .iter()
            .map(|image| self.preprocessor.preprocess(image))
            .collect::<anyhow::Result<Vec<_>>>()?;

        if prepared.is_empty() {
            return Ok(Vec::new());
        }

        if self.config.dynamic_batch {
            let batch = stack_batch(&prepared)?;
            let predictions = self.run_session(&batch)?;

            if predictions.ndim() != 3 || predictions.shape()[0] != prepared.len() {
                anyhow::bail!(
                    "Unexpected output shape {:?} for a batch of {}",
                    predictions.shape(),
                    prepared.len()
                );
            }

            prepared
                .iter()
                .enumerate()
                .map(|(i, item)| self.decode(&predictions, i, item))
                .collect()
        } else {
            let mut results = Vec::with_capacity(prepared.len());
            for item in &prepared {
                let predictions = self.run_session(&item.data)?;
                if predictions.ndim() != 3 || predictions.shape()[0] != 1 {
                    anyhow::bail!("Unexpected output shape {:?}", predictions.shape());
                }
                results.push(self.decode(&predictions, 0, item)?);
            }
            Ok(results)
        }
    }
}
