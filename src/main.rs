use anyhow::{Context, Result};
use clap::Parser;
use leaf_lesion::{
    analysis::{AnalysisPipeline, AnalysisStatus},
    config::Config,
    models::ModelCache,
    AnalysisError, AnalysisResult,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "leaf-lesion")]
#[command(about = "Leaf disease classification and lesion coverage analysis")]
struct Args {
    /// Images to analyze
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Model directory path
    #[arg(long, default_value = ".")]
    models_dir: PathBuf,

    /// JSON file overriding thresholds, trusted architectures and labels
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of images analyzed concurrently
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable development mode (stage progress in debug logs)
    #[arg(long)]
    dev: bool,

    /// Pretty-print each JSON record
    #[arg(long)]
    pretty: bool,
}

/// 每个输入对应一条输出记录
#[derive(Debug, Serialize)]
struct Report {
    success: bool,
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<serde_json::Value>,
    timestamp: String,
    request_id: String,
}

impl Report {
    fn from_outcome(source: String, request_id: String, outcome: leaf_lesion::Result<AnalysisResult>) -> Self {
        let (data, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(e) => {
                let mut body = e.to_json();
                (None, Some(body["error"].take()))
            }
        };

        Self {
            success: data.is_some(),
            source,
            data,
            error,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting leaf lesion analysis...");
    tracing::info!("Models directory: {}", args.models_dir.display());

    let mut config = Config::new(args.models_dir.clone(), args.workers, args.dev)?;
    if let Some(path) = &args.config {
        config = config
            .merge_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
    }

    let models = Arc::new(ModelCache::from_config(&config)?);
    let pipeline = Arc::new(AnalysisPipeline::new(Arc::clone(&models), &config.analysis));
    let permits = Arc::new(Semaphore::new(config.workers));

    tracing::info!("Analyzing {} image(s) with {} worker(s)", args.images.len(), config.workers);

    let mut tasks = Vec::with_capacity(args.images.len());
    for path in args.images.clone() {
        let pipeline = Arc::clone(&pipeline);
        let permits = Arc::clone(&permits);
        let dev_mode = config.dev_mode;

        tasks.push(tokio::spawn(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            let source = path.display().to_string();
            let _permit = permits.acquire_owned().await;

            let outcome = match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let status_tx = dev_mode.then(|| spawn_progress_logger(request_id.clone()));
                    pipeline.analyze_async(bytes, status_tx).await
                }
                Err(e) => Err(AnalysisError::Io(e)),
            };

            if let Err(e) = &outcome {
                tracing::error!("Analysis failed: request_id={}, source={}, error={}", request_id, source, e);
            }

            Report::from_outcome(source, request_id, outcome)
        }));
    }

    let mut failures = 0;
    for task in tasks {
        let report = task.await.context("Analysis task panicked")?;
        if !report.success {
            failures += 1;
        }

        let line = if args.pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{}", line);
    }

    tracing::info!("Model stats: {}", serde_json::to_string(&models.stats())?);

    if failures > 0 {
        anyhow::bail!("{} of {} image(s) failed", failures, args.images.len());
    }

    Ok(())
}

/// 开发模式下把阶段进度写入调试日志
fn spawn_progress_logger(request_id: String) -> mpsc::UnboundedSender<AnalysisStatus> {
    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<AnalysisStatus>();

    tokio::spawn(async move {
        while let Some(status) = status_rx.recv().await {
            tracing::debug!(
                "Analysis progress [{}]: {:?} - {:.1}% - {}",
                request_id,
                status.stage,
                status.progress * 100.0,
                status.message
            );
        }
    });

    status_tx
}
