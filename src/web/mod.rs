pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::{emotion::EmotionPipeline, models::ModelManager, utils::error::MoodError, Config, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: EmotionPipeline,
}

pub async fn serve(config: Config) -> Result<()> {
    // 启动时加载一次模型
    let models = ModelManager::load(&config)?;
    let pipeline = EmotionPipeline::new(Arc::new(models));

    let app = create_app(&config, pipeline);

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        MoodError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /predict_emotion - Multipart image upload (field: image)");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  GET  /api/info        - Service information");

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| MoodError::Internal(format!("Failed to bind to address {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MoodError::Internal(format!("Server failed to start: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

pub fn create_app(config: &Config, pipeline: EmotionPipeline) -> Router {
    let state = AppState {
        config: config.clone(),
        pipeline,
    };
    let max_request_size = config.server_config.max_request_size;

    Router::new()
        .route("/predict_emotion", post(handlers::predict_emotion_handler))
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        // 超限在读取multipart时报错，由处理器转换为413 JSON
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server_config.request_timeout,
        )))
        .layer(axum::middleware::from_fn(middleware::json_errors))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let pipeline = state.pipeline.clone();

    tokio::task::spawn_blocking(move || pipeline.models().health_check())
        .await
        .map_err(|e| MoodError::Internal(format!("Health check task failed: {}", e)))??;

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// 服务信息端点
async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.pipeline.models().get_stats();

    Json(json!({
        "service": "Emotion ONNX Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "models": stats,
        "limits": {
            "max_request_size": state.config.server_config.max_request_size,
            "request_timeout_secs": state.config.server_config.request_timeout
        }
    }))
}
