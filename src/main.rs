use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use clipforge::app_state::AppState;
use clipforge::config::AppConfig;
use clipforge::routes;
use clipforge::services::{credential::CredentialHolder, gemini::GeminiClient};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing clipforge server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("generation_jobs_total", "Generation jobs submitted, by kind");
    metrics::describe_counter!(
        "generation_jobs_succeeded",
        "Generation jobs that reached Succeeded"
    );
    metrics::describe_counter!(
        "generation_jobs_failed",
        "Generation jobs that reached Failed, by kind and category"
    );
    metrics::describe_histogram!(
        "generation_job_seconds",
        "Wall time from job start to terminal state"
    );
    metrics::describe_counter!("video_polls_total", "Status polls issued for video operations");
    metrics::describe_counter!("frames_captured_total", "Frames captured into the gallery");
    metrics::describe_gauge!("gallery_frames", "Frames currently in the gallery");

    // Load persisted credential
    let credential = CredentialHolder::load(config.credential_path(), config.gemini_api_key.as_deref())
        .expect("Failed to read persisted API key");

    // Initialize generative API client
    tracing::info!(api_base = %config.gemini_api_base, "Initializing Gemini client");
    let client = GeminiClient::new(&config.gemini_api_base, config.models())
        .expect("Failed to initialize Gemini client");

    let state = AppState::new(
        credential,
        Arc::new(client),
        config.runner_config(),
        &config.video_resolution,
    );

    let app = routes::router(state)
        .route(
            "/metrics",
            get(routes::metrics::render_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    tracing::info!("Starting clipforge on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
