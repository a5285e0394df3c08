use common::{Environment, LogLevel};
use inference::{BackendConfig, ExecutionProvider};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub bind_addr: String,
    pub model_path: PathBuf,
    pub uploads_dir: PathBuf,
    /// Comma-separated labels, indexed by model class id
    pub class_names: String,
    pub input_size: u32,
    pub nms_score_floor: f32,
    pub iou_threshold: f32,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
    pub dynamic_batch: bool,
    pub input_name: String,
    pub output_name: String,
    pub inference_timeout_secs: u64,
    pub max_pending_requests: usize,
    pub max_upload_bytes: usize,
    pub otel_endpoint: Option<String>,
}

impl Config {
    pub fn class_labels(&self) -> Vec<String> {
        self.class_names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            model_path: self.model_path.clone(),
            input_size: (self.input_size, self.input_size),
            input_name: self.input_name.clone(),
            output_name: self.output_name.clone(),
            execution_provider: self.execution_provider,
            intra_threads: self.intra_threads,
            dynamic_batch: self.dynamic_batch,
            nms_score_floor: self.nms_score_floor,
            iou_threshold: self.iou_threshold,
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    build_configuration(config::Environment::with_prefix("GATEWAY"))
}

fn build_configuration(source: config::Environment) -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("bind_addr", "0.0.0.0:5001")?
        .set_default("model_path", "models/best.onnx")?
        .set_default("uploads_dir", "uploads")?
        .set_default("class_names", "bunny")?
        .set_default("input_size", 640)?
        .set_default("nms_score_floor", 0.25)?
        .set_default("iou_threshold", 0.45)?
        .set_default("execution_provider", "cpu")?
        .set_default("intra_threads", 4)?
        .set_default("dynamic_batch", true)?
        .set_default("input_name", "images")?
        .set_default("output_name", "output0")?
        .set_default("inference_timeout_secs", 60)?
        .set_default("max_pending_requests", 4)?
        .set_default("max_upload_bytes", 64 * 1024 * 1024)?
        .add_source(
            source
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    if config.max_pending_requests == 0 {
        return Err(config::ConfigError::Message(
            "max_pending_requests must be at least 1".to_string(),
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<Config, config::ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        build_configuration(config::Environment::with_prefix("GATEWAY").source(Some(map)))
    }

    #[test]
    fn test_defaults() {
        let config = from_vars(&[]).unwrap();

        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr, "0.0.0.0:5001");
        assert_eq!(config.class_labels(), vec!["bunny".to_string()]);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.inference_timeout(), Duration::from_secs(60));
        assert!(config.dynamic_batch);
        assert!(config.otel_endpoint.is_none());

        let backend = config.backend_config();
        assert_eq!(backend.input_size, (640, 640));
        assert!((backend.iou_threshold - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_environment_overrides() {
        let config = from_vars(&[
            ("GATEWAY_ENVIRONMENT", "production"),
            ("GATEWAY_LOG_LEVEL", "debug"),
            ("GATEWAY_MODEL_PATH", "/srv/models/rabbit.onnx"),
            ("GATEWAY_CLASS_NAMES", "bunny, hare ,"),
            ("GATEWAY_DYNAMIC_BATCH", "false"),
            ("GATEWAY_EXECUTION_PROVIDER", "cuda"),
            ("GATEWAY_INFERENCE_TIMEOUT_SECS", "5"),
            ("GATEWAY_OTEL_ENDPOINT", "http://collector:4317"),
        ])
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.model_path, PathBuf::from("/srv/models/rabbit.onnx"));
        assert_eq!(config.class_labels(), vec!["bunny", "hare"]);
        assert!(!config.dynamic_batch);
        assert_eq!(config.execution_provider, ExecutionProvider::Cuda);
        assert_eq!(config.inference_timeout(), Duration::from_secs(5));
        assert_eq!(config.otel_endpoint.as_deref(), Some("http://collector:4317"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(from_vars(&[("GATEWAY_ENVIRONMENT", "staging")]).is_err());
        assert!(from_vars(&[("GATEWAY_MAX_PENDING_REQUESTS", "0")]).is_err());
    }
}
