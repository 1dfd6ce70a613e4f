//! live-classify - classify camera frames and show the top label
//!
//! 1. Loads configuration (file, env, flags)
//! 2. Builds the camera, permission and classifier collaborators
//! 3. Requests camera access and starts capture
//! 4. Renders the latest result or status until Ctrl-C or `--seconds`

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use live_classify::{
    camera_for, classifier_for, provider_for, state, CaptureController, Collaborators,
    LiveClassifyConfig, PermissionMode, Presenter, Ui, UiMode,
};

const PUMP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON or TOML config file (overrides LIVE_CLASSIFY_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera device: a V4L2 node such as /dev/video0, or stub://back_camera.
    #[arg(long)]
    device: Option<String>,

    /// Permission mode (granted|denied|restricted|prompt|auto).
    #[arg(long, value_name = "MODE")]
    permission: Option<String>,

    /// Classifier backend (stub|tract).
    #[arg(long)]
    backend: Option<String>,

    /// ONNX model path (tract backend).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Label file, one class per line.
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Minimum milliseconds between classifications.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// UI mode for stderr output (auto|plain|pretty).
    #[arg(long, value_name = "MODE")]
    ui: Option<String>,

    /// Exit after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = load_config(&args)?;
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::new(cfg.ui_mode, is_tty, !stdout_is_tty);

    let classifier = {
        let _stage = ui.stage("Load classifier");
        let mut classifier = classifier_for(&cfg.classifier)?;
        classifier.warm_up()?;
        log::info!("classifier backend: {}", classifier.name());
        classifier
    };
    let collaborators = Collaborators {
        camera: camera_for(&cfg.camera)?,
        permissions: provider_for(&cfg.camera),
        classifier,
    };

    let (publisher, updates) = state::channel();
    let controller = CaptureController::new(collaborators, cfg.throttle_interval, publisher)?;
    let mut presenter = Presenter::new(controller, updates, ui.overlay_view());

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "live-classify running: device={} interval={:?}",
        cfg.camera.device,
        cfg.throttle_interval
    );
    let deadline = args
        .seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));

    presenter.appear();
    loop {
        if shutdown_rx.try_recv().is_ok() {
            log::info!("shutdown signal received, stopping capture...");
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        if !presenter.pump(PUMP_INTERVAL) {
            break;
        }
    }
    match presenter.controller().session_snapshot() {
        Ok(snapshot) => log::debug!("final session: {:?}", snapshot),
        Err(err) => log::warn!("session worker unavailable: {:#}", err),
    }

    let last = presenter.finish();
    if let Some(result) = last.latest_result {
        log::info!(
            "last result: {} {}",
            result.identifier,
            result.confidence_description()
        );
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<LiveClassifyConfig> {
    let mut cfg = match &args.config {
        Some(path) => LiveClassifyConfig::load_from(path)?,
        None => LiveClassifyConfig::load()?,
    };
    if let Some(device) = &args.device {
        cfg.camera.device = device.clone();
    }
    if let Some(mode) = &args.permission {
        cfg.camera.permission = PermissionMode::parse(mode)?;
    }
    if let Some(backend) = &args.backend {
        cfg.classifier.backend = backend.clone();
    }
    if let Some(model) = &args.model {
        cfg.classifier.model_path = Some(model.clone());
    }
    if let Some(labels) = &args.labels {
        cfg.classifier.labels_path = Some(labels.clone());
    }
    if let Some(interval_ms) = args.interval_ms {
        cfg.throttle_interval = Duration::from_millis(interval_ms);
    }
    if let Some(mode) = &args.ui {
        cfg.ui_mode = UiMode::parse(mode)?;
    }
    cfg.validate()?;
    Ok(cfg)
}
