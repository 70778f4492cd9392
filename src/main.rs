//! hwinfo-deck - Headless runner
//!
//! Starts the telemetry companion, binds the tiles listed in the config file
//! and renders them as log lines until Ctrl+C.

use anyhow::Context;
use hwinfo_deck::{
    config::{self, DeckConfig},
    logging,
    service::{ProcessLauncher, ServiceEvent, TelemetryServiceClient},
    tiles::{LogTransport, TextRenderer, TileWorker, TileWorkerOptions},
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    // Resolved against the caller's directory, before we move
    let config_path = std::env::args_os()
        .nth(1)
        .map(|arg| absolute_from_cwd(PathBuf::from(arg)))
        .or_else(config::default_config_path);

    // Relative resources (placeholder image, companion, log file) live next to us
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    std::env::set_current_dir(&exe_dir)
        .with_context(|| format!("cannot change directory to {:?}", exe_dir))?;
    let (config, config_error) = match &config_path {
        Some(path) if path.exists() => match DeckConfig::load(path) {
            Ok(config) => (config, None),
            Err(e) => (DeckConfig::default(), Some(e)),
        },
        _ => (DeckConfig::default(), None),
    };

    let _log_guard = logging::init_deck_logging(&config.logging, &exe_dir)
        .context("failed to initialise logging")?;
    tracing::info!("Starting hwinfo-deck");
    match (&config_path, config_error) {
        (Some(path), Some(e)) => tracing::warn!("Failed to load {:?}, using defaults: {}", path, e),
        (Some(path), None) if path.exists() => tracing::info!("Loaded config from {:?}", path),
        _ => tracing::info!("No config file, using defaults"),
    }

    let launcher = ProcessLauncher::new(&config.service, &config.reader)
        .context("telemetry service cannot be launched")?;
    tracing::info!("Telemetry service executable: {:?}", launcher.executable());
    let client = TelemetryServiceClient::start(Box::new(launcher), &config.service)
        .context("telemetry service failed to start")?;
    let events = client.events();
    let client = Arc::new(client);

    let placeholder = match std::fs::read(&config.display.placeholder_image) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(
                "Failed to read placeholder {:?}: {}",
                config.display.placeholder_image,
                e
            );
            None
        }
    };

    let deck = TileWorker::spawn(
        TileWorkerOptions::from_display(&config.display, placeholder),
        client.clone(),
        Box::new(TextRenderer),
        Box::new(LogTransport),
    )
    .context("failed to start tile worker")?;
    for tile in &config.tiles {
        deck.show(tile.context.clone(), tile.settings.clone());
    }
    tracing::info!("{} tile(s) bound", config.tiles.len());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to install Ctrl+C handler")?;

    while running.load(Ordering::SeqCst) {
        if let Ok(event) = events.recv_timeout(Duration::from_millis(200)) {
            match event {
                ServiceEvent::RelaunchFailed(reason) => {
                    tracing::error!("Telemetry service relaunch failed: {}", reason)
                }
                other => tracing::debug!("{:?}", other),
            }
        }
    }

    tracing::info!("Shutting down...");
    deck.shutdown();
    // The worker held the other reference; dropping the last one stops the service
    drop(client);
    Ok(())
}

fn absolute_from_cwd(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}
