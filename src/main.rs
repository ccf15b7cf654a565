//! Reelcast server binary.
//!
//! Wires up:
//! - ffprobe/ffmpeg subprocess adapters
//! - stream cache, job lock and media index
//! - transcode orchestrator and readiness gate
//! - HTTP inbound adapter

use reelcast::adapters::local::http::{self, AppState};
use reelcast::adapters::local::{EventHub, FfmpegEncoder, FfmpegSubtitleExtractor, FfprobeProber};
use reelcast::application::cache::StreamCache;
use reelcast::application::gate::ReadinessGate;
use reelcast::application::index::MediaIndex;
use reelcast::application::lock::JobLock;
use reelcast::application::orchestrator::{
    JobScheduler, OrchestratorSettings, TranscodeOrchestrator,
};
use reelcast::domain::hls::SEGMENT_SECONDS;
use reelcast::StreamerConfig;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = StreamerConfig::from_env();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reelcast=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run(config: StreamerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // 1. Index and on-disk state
    let index = Arc::new(MediaIndex::new(&config.media_root, &config.index_file));
    index.rescan().await?;

    let cache = StreamCache::open(&config.streams_dir, config.cache_capacity).await?;
    let removed = cache.reconcile().await?;
    if !removed.is_empty() {
        tracing::info!(count = removed.len(), "Cleaned up interrupted transcodes");
    }

    let lock = JobLock::new(&config.lock_file);
    lock.clear_stale().await?;
    tokio::fs::create_dir_all(&config.subtitles_dir).await?;

    // 2. Application services
    let events = Arc::new(EventHub::new());
    let orchestrator = TranscodeOrchestrator::new(
        FfprobeProber::new(&config.ffprobe_path),
        FfmpegEncoder::new(&config.ffmpeg_path),
        cache.clone(),
        lock.clone(),
        events.clone(),
        OrchestratorSettings {
            lock_retry: config.lock_retry,
            progress_interval: config.progress_interval,
            segment_seconds: SEGMENT_SECONDS,
        },
    );
    let scheduler: Arc<dyn JobScheduler> = Arc::new(orchestrator);

    let subtitles = Arc::new(FfmpegSubtitleExtractor::new(
        FfprobeProber::new(&config.ffprobe_path),
        &config.ffmpeg_path,
        &config.subtitles_dir,
    ));

    let gate = Arc::new(ReadinessGate::new(
        scheduler.clone(),
        subtitles,
        index.clone(),
        cache.clone(),
        events,
        config.ready_poll,
        config.ready_timeout,
    ));

    // 3. HTTP layer
    let app = http::router(AppState {
        gate,
        scheduler,
        index,
        cache,
        lock,
        subtitles_dir: config.subtitles_dir.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(
        addr = %config.bind_addr(),
        media_root = %config.media_root.display(),
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
