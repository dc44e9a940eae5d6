mod app;
mod config;
mod helper;
mod messages;
mod presenter;
mod shortcuts;
mod typing;
mod watchdog;

use app::App;
use config::Config;
use helper::ProcessLauncher;
use messages::Trigger;
use presenter::{DesktopPresenter, FileConfig, Indicator};
use shortcuts::Shortcut;
use typing::ClipboardPaste;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stdout carries the indicator stream, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VOICEKEY_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting voicekey recording supervisor");

    let config_path = Config::config_path()?;
    let config = Config::load_from(&config_path)?;
    config.validate().context("Invalid configuration")?;

    run_app(config, config_path).await
}

async fn run_app(config: Config, config_path: PathBuf) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel(32);
    let (trigger_tx, mut trigger_rx) = mpsc::channel(10);

    let (presenter, indicator_rx) = DesktopPresenter::new(config_path.clone());
    tokio::spawn(print_indicator(indicator_rx));

    let mut app = App::new(
        presenter,
        Box::new(FileConfig::new(config_path)),
        Box::new(ProcessLauncher::new(event_tx.clone())),
        Arc::new(ClipboardPaste),
        event_tx,
    );

    let bindings = shortcut_bindings(&config)?;
    tokio::spawn(async move {
        if let Err(e) = shortcuts::monitor_keyboards(bindings, trigger_tx).await {
            tracing::error!("Keyboard shortcuts unavailable: {:#}", e);
        }
    });

    let mut usr1 = signal(SignalKind::user_defined1()).context("Failed to listen for SIGUSR1")?;
    let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;

    tracing::info!(
        "Ready! Press {} or send SIGUSR1 to start/stop recording",
        config.primary_shortcut
    );

    loop {
        tokio::select! {
            Some(trigger) = trigger_rx.recv() => app.handle_trigger(trigger),
            Some(event) = event_rx.recv() => app.handle_event(event),
            _ = usr1.recv() => {
                tracing::debug!("Main loop: received SIGUSR1");
                app.handle_trigger(Trigger::Click);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
            _ = term.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    app.teardown();
    tracing::info!("voicekey shutdown complete");
    Ok(())
}

fn shortcut_bindings(config: &Config) -> Result<Vec<(Shortcut, Trigger)>> {
    let mut bindings = vec![(
        shortcuts::parse_shortcut(&config.primary_shortcut)?,
        Trigger::Click,
    )];

    for (index, prompt) in config.custom_prompts.iter().enumerate() {
        if let Some(shortcut) = &prompt.shortcut {
            let parsed = shortcuts::parse_shortcut(shortcut)
                .with_context(|| format!("Invalid shortcut for prompt {:?}", prompt.name))?;
            bindings.push((parsed, Trigger::Prompt(index)));
        }
    }

    Ok(bindings)
}

/// Write the indicator as one JSON line per change.
async fn print_indicator(mut rx: watch::Receiver<Indicator>) {
    loop {
        match serde_json::to_string(&*rx.borrow_and_update()) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Failed to serialize indicator: {}", e),
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}
