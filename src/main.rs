//! VoxBot service entry point

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tokio::io::AsyncBufReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voxbot::application::formatting::FormatBackendKind;
use voxbot::application::ports::{StoreError, UserStore};
use voxbot::application::{
    AdmissionService, BalanceLedger, BatchAggregator, BatchDispatch, FormattingChain, JobWorker,
    ServiceContext, SettlementService,
};
use voxbot::domain::{AppConfig, IncomingFile, TranscribeBackend, User};
use voxbot::infrastructure::{
    ConsoleChat, DashScopeFormatter, DashScopeSpeech, FfmpegConverter, GatewayFormatter,
    MemoryQueue, MemoryStore, TracingMetrics,
};

/// Minute balance a previously unseen user starts with in local runs
const LOCAL_SEED_MINUTES: i64 = 100;

#[derive(Debug, Parser)]
#[command(name = "voxbot", about = "Transcription-job pipeline for a chat bot")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of worker tasks, overrides the config file
    #[arg(short, long)]
    workers: Option<usize>,
}

/// One submission line on stdin: user, chat and the file fields
#[derive(Debug, Deserialize)]
struct Submission {
    user_id: i64,
    chat_id: i64,
    #[serde(flatten)]
    file: IncomingFile,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "could not load config");
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let chat = Arc::new(ConsoleChat::new());
    let media = Arc::new(FfmpegConverter::new());

    if config.transcribe_backend_or_default() == TranscribeBackend::Gpu {
        warn!("gpu transcription is not built in, using the cloud API");
    }
    let speech = Arc::new(DashScopeSpeech::new(
        config.dashscope_api_key.clone().unwrap_or_default(),
    ));

    let metrics = Arc::new(TracingMetrics::new());
    let primary: FormatBackendKind = config
        .format_backend
        .as_deref()
        .unwrap_or("qwen")
        .parse()
        .unwrap_or_default();
    let formatting = Arc::new(FormattingChain::new(
        Arc::new(DashScopeFormatter::new(config.dashscope_api_key.clone())),
        Arc::new(GatewayFormatter::new(
            config.gateway_api_key.clone(),
            config.gateway_model.clone(),
        )),
        primary,
        metrics,
    ));

    let ledger = Arc::new(BalanceLedger::new(
        store.clone(),
        config.balance_max_retries_or_default(),
    ));
    let settlement = Arc::new(SettlementService::new(
        store.clone(),
        store.clone(),
        ledger,
    ));

    let ctx = Arc::new(ServiceContext {
        users: store.clone(),
        jobs: store.clone(),
        queue: queue.clone(),
        chat: chat.clone(),
        media,
        speech,
        formatting,
        settlement,
        queue_wait: config.queue_wait_or_default(),
        max_message_length: config.max_message_length_or_default(),
    });

    let admission: Arc<dyn BatchDispatch> = Arc::new(AdmissionService::new(
        store.clone(),
        store.clone(),
        queue.clone(),
        chat.clone(),
        config.max_file_size_or_default(),
        config.default_estimate_minutes_or_default(),
    ));
    let aggregator = Arc::new(BatchAggregator::new(
        config.aggregation_window_or_default(),
        admission,
    ));

    let shutdown = Arc::new(AtomicBool::new(false));
    let worker_count = cli.workers.unwrap_or_else(|| config.workers_or_default());
    info!(workers = worker_count, backend = %primary, "starting");

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let worker = JobWorker::new(ctx.clone(), shutdown.clone());
        handles.push(tokio::spawn(async move { worker.run(worker_id).await }));
    }

    let ingress = tokio::spawn(run_ingress(aggregator, store.clone()));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "could not listen for shutdown signal"),
    }
    shutdown.store(true, Ordering::SeqCst);
    ingress.abort();

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "worker task panicked");
        }
    }

    info!("stopped");
    ExitCode::SUCCESS
}

/// Layer config sources: defaults, then file, then environment
async fn load_config(cli: &Cli) -> Result<AppConfig, voxbot::domain::ConfigError> {
    let mut config = AppConfig::defaults();
    if let Some(path) = &cli.config {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| voxbot::domain::ConfigError::Read(e.to_string()))?;
        config = config.merge(AppConfig::from_toml_str(&content)?);
    }
    Ok(config.merge(AppConfig::from_env()))
}

/// Local ingress: one JSON submission per stdin line, fed through the batch
/// aggregator. Runs until stdin closes.
async fn run_ingress(aggregator: Arc<BatchAggregator>, users: Arc<MemoryStore>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let submission: Submission = match serde_json::from_str(line) {
                    Ok(submission) => submission,
                    Err(e) => {
                        warn!(error = %e, "unparseable submission line");
                        continue;
                    }
                };
                if let Err(e) = ensure_user(users.as_ref(), submission.user_id).await {
                    error!(user_id = submission.user_id, error = %e, "could not load user");
                    continue;
                }
                aggregator
                    .submit(submission.user_id, submission.chat_id, submission.file)
                    .await;
            }
            Ok(None) => {
                info!("ingress input closed");
                return;
            }
            Err(e) => {
                error!(error = %e, "could not read ingress input");
                return;
            }
        }
    }
}

/// Seed an account on first contact so local submissions can clear admission
async fn ensure_user(users: &dyn UserStore, user_id: i64) -> Result<(), StoreError> {
    if users.get_user(user_id).await?.is_none() {
        users
            .put_user(&User::new(user_id, "local", LOCAL_SEED_MINUTES))
            .await?;
    }
    Ok(())
}
