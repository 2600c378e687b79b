use anyhow::Result;
use clap::Parser;
use emotion_onnx::{config::Config, web::serve};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emotion-onnx")]
#[command(about = "Facial emotion recognition service powered by ONNX Runtime")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:5001")]
    bind: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, default_value = "models")]
    models_dir: String,

    /// Emotion classifier (.onnx), defaults to <models-dir>/emotion_classifier.onnx
    #[arg(long)]
    classifier_model: Option<String>,

    /// Haar cascade (.xml), defaults to <models-dir>/haarcascade_frontalface_default.xml
    #[arg(long)]
    cascade: Option<String>,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting emotion recognition service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Models directory: {}", args.models_dir);

    let config = Config::new(args.bind, args.models_dir, args.workers, args.dev)?
        .with_classifier_path(args.classifier_model)
        .with_cascade_path(args.cascade);

    tracing::info!("Emotion model: {}", config.classifier_model_path().display());
    tracing::info!("Face cascade: {}", config.cascade_path().display());
    tracing::info!("Worker threads: {}", config.workers);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))?;

    Ok(())
}
