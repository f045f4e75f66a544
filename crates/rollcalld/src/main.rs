use anyhow::{Context, Result};
use clap::Parser;
use rollcall_core::{AttendanceLog, OnnxExtractor};
use rollcalld::config::Config;
use rollcalld::engine::spawn_engine;
use rollcalld::{build_router, AppState};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollcalld", about = "Rollcall face-recognition attendance daemon")]
struct Args {
    /// TOML config file; `ROLLCALL_*` environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Listen address, overrides the config file and environment
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    tracing::info!(?config, "rollcalld starting");

    for dir in [&config.known_faces_dir, &config.uploads_dir] {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let attendance = AttendanceLog::open(&config.exports_dir).context("opening attendance log")?;

    // Fail fast if the models are missing
    let extractor = OnnxExtractor::load(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;
    let engine = spawn_engine(extractor, Duration::from_secs(config.extract_timeout_secs))?;

    let state = AppState::new(&config, engine, attendance);
    let report = state.registry.reload(&state.engine).await?;
    if report.loaded == 0 {
        tracing::warn!(
            dir = %config.known_faces_dir.display(),
            "no known faces enrolled; every face will be reported as unknown"
        );
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "rollcalld ready");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("rollcalld shutting down");
    Ok(())
}
