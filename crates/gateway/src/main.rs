use common::TelemetryGuard;
use gateway::{
    AppState, Detector, ModelInfo, UploadDir, config::get_configuration, logging::setup_logging,
    router,
};
use inference::InferenceBackend;

#[cfg(feature = "ort-backend")]
use inference::backend::ort::OrtBackend as Backend;

#[cfg(not(feature = "ort-backend"))]
compile_error!("The gateway binary needs a backend feature: enable 'ort-backend'");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;

    let telemetry = config
        .otel_endpoint
        .as_ref()
        .map(|endpoint| TelemetryGuard::init("gateway", endpoint))
        .transpose()?;

    setup_logging(&config, telemetry.as_ref());

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    let uploads = UploadDir::create(&config.uploads_dir)?;
    tracing::info!(path = %uploads.path().display(), "Upload directory ready");

    tracing::info!(model_path = %config.model_path.display(), "Loading detection model");
    let backend: Box<dyn InferenceBackend> = match Backend::load_model(&config.backend_config()) {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            tracing::error!(
                model_path = %config.model_path.display(),
                error = %format!("{e:#}"),
                "Failed to load detection model"
            );
            return Err(e);
        }
    };
    tracing::info!("Model loaded successfully");

    let detector = Detector::new(
        backend,
        config.class_labels(),
        config.max_pending_requests,
        config.inference_timeout(),
    );
    let model = ModelInfo {
        path: config.model_path.display().to_string(),
        loaded: true,
    };
    let app = router(
        AppState::new(detector, uploads, model),
        config.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        routes = "POST /detect, POST /detect-batch, GET /health",
        "Gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
