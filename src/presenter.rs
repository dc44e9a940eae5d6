//! Desktop-facing side effects of the state machine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify_rust::{Notification, Urgency};
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::messages::AppState;

pub const APP_NAME: &str = "voicekey";
pub const NOTIFY_TITLE: &str = "Voice Keyboard";

/// First stdout line of a helper that copied its result to the clipboard
/// instead of typing it, because the focused window changed meanwhile.
pub const WINDOW_CHANGED: &str = "WINDOW_CHANGED";

/// Everything the state machine asks of the user interface.
///
/// `clear_effects` runs for the state being left, before the state field
/// changes; `present_icon` runs for the state being entered, after.
pub trait Presenter {
    fn clear_effects(&mut self, state: AppState);
    fn present_icon(&mut self, state: AppState);
    fn present_error(&mut self, message: &str);
    fn notify(&mut self, title: &str, message: &str);
    fn open_configuration(&mut self);
    /// Auxiliary stdout payload of a successful session.
    fn present_result(&mut self, text: &str);
}

/// Where the state machine reads configuration from when a session starts.
pub trait ConfigSource {
    fn snapshot(&self) -> Result<Config>;
}

/// Reads the config file afresh for every snapshot, so edits apply to the
/// next recording without a restart.
pub struct FileConfig {
    path: PathBuf,
}

impl FileConfig {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ConfigSource for FileConfig {
    fn snapshot(&self) -> Result<Config> {
        Config::load_from(&self.path)
    }
}

/// Snapshot of the panel indicator, serialized as one JSON line per change
/// in the format status bars such as waybar read from custom modules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indicator {
    pub text: String,
    pub tooltip: String,
    pub class: &'static str,
    pub alt: &'static str,
}

impl Indicator {
    pub fn for_state(state: AppState) -> Self {
        let (class, tooltip) = match state {
            AppState::Idle => ("idle", "Voice Keyboard - Click to start voice input".to_string()),
            AppState::Recording => ("recording", "Recording... click to stop".to_string()),
            AppState::Processing => ("processing", "Transcribing... click to cancel".to_string()),
            AppState::Typing => ("typing", "Typing recognized text".to_string()),
            AppState::Error => ("error", "Voice input failed - click for details".to_string()),
        };

        Self {
            text: icon_name(state).to_string(),
            tooltip,
            class,
            alt: class,
        }
    }
}

pub fn icon_name(state: AppState) -> &'static str {
    match state {
        AppState::Idle => "audio-input-microphone-symbolic",
        AppState::Recording => "media-record-symbolic",
        AppState::Processing => "content-loading-symbolic",
        AppState::Typing => "input-keyboard-symbolic",
        AppState::Error => "dialog-warning-symbolic",
    }
}

const PULSE_FRAMES: [&str; 2] = ["recording", "recording-dim"];
const LOADING_FRAMES: [&str; 8] = [
    "loading-1",
    "loading-2",
    "loading-3",
    "loading-4",
    "loading-5",
    "loading-6",
    "loading-7",
    "loading-8",
];
const FRAME_INTERVAL: Duration = Duration::from_millis(500);

fn animation_frames(state: AppState) -> Option<&'static [&'static str]> {
    match state {
        AppState::Recording => Some(&PULSE_FRAMES),
        AppState::Processing => Some(&LOADING_FRAMES),
        _ => None,
    }
}

/// Cycle the indicator's `alt` field until aborted.
async fn animate(indicator: Arc<watch::Sender<Indicator>>, frames: &'static [&'static str]) {
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    for frame in frames.iter().cycle() {
        ticker.tick().await;
        indicator.send_modify(|i| i.alt = *frame);
    }
}

/// Text following the [`WINDOW_CHANGED`] sentinel, if the helper sent one.
pub fn window_changed_text(stdout: &str) -> Option<&str> {
    let (first, rest) = stdout.split_once('\n').unwrap_or((stdout, ""));
    (first.trim() == WINDOW_CHANGED).then(|| rest.trim())
}

/// Presents through desktop notifications and a watch channel carrying the
/// panel indicator.
pub struct DesktopPresenter {
    indicator: Arc<watch::Sender<Indicator>>,
    animation: Option<JoinHandle<()>>,
    config_path: PathBuf,
}

impl DesktopPresenter {
    pub fn new(config_path: PathBuf) -> (Self, watch::Receiver<Indicator>) {
        let (indicator, rx) = watch::channel(Indicator::for_state(AppState::Idle));
        (
            Self {
                indicator: Arc::new(indicator),
                animation: None,
                config_path,
            },
            rx,
        )
    }

    fn show(&self, summary: &str, body: &str, urgency: Urgency) {
        Notification::new()
            .appname(APP_NAME)
            .icon("audio-input-microphone")
            .summary(summary)
            .body(body)
            .urgency(urgency)
            .show()
            .map_err(|e| tracing::error!("Failed to send notification: {}", e))
            .ok();
    }
}

impl Presenter for DesktopPresenter {
    fn clear_effects(&mut self, state: AppState) {
        if let Some(animation) = self.animation.take() {
            tracing::debug!(?state, "Stopping indicator animation");
            animation.abort();
        }
    }

    fn present_icon(&mut self, state: AppState) {
        let indicator = Indicator::for_state(state);
        tracing::debug!(icon = %indicator.text, "Indicator updated");
        self.indicator.send_replace(indicator);

        if let Some(frames) = animation_frames(state) {
            self.animation = Some(tokio::spawn(animate(self.indicator.clone(), frames)));
        }
    }

    fn present_error(&mut self, message: &str) {
        self.show(&format!("{} Error", NOTIFY_TITLE), message, Urgency::Critical);
    }

    fn notify(&mut self, title: &str, message: &str) {
        tracing::info!("Notify: {}: {}", title, message);
        self.show(title, message, Urgency::Normal);
    }

    fn open_configuration(&mut self) {
        open_in_editor(&self.config_path);
    }

    fn present_result(&mut self, text: &str) {
        match window_changed_text(text) {
            Some(copied) => self.notify(
                NOTIFY_TITLE,
                &format!("Window changed - text copied to clipboard:\n{}", copied),
            ),
            None => tracing::info!("Recognized: {}", text),
        }
    }
}

/// Open the config file with the desktop's default handler, without waiting.
fn open_in_editor(path: &std::path::Path) {
    let path = path.to_owned();

    tokio::task::spawn(async move {
        tracing::info!("Opening configuration {:?}", path);

        match Command::new("xdg-open")
            .arg(&path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(child) => match child.wait_with_output().await {
                Ok(output) => {
                    if !output.status.success() {
                        let stderr = String::from_utf8_lossy(&output.stderr);
                        tracing::warn!("xdg-open exited with {}: {}", output.status, stderr.trim());
                    }
                }
                Err(e) => tracing::warn!("Failed to wait on xdg-open: {}", e),
            },
            Err(e) => tracing::warn!("Failed to spawn xdg-open: {}", e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_changed_sentinel() {
        assert_eq!(
            window_changed_text("WINDOW_CHANGED\nHello world\n"),
            Some("Hello world")
        );
        assert_eq!(window_changed_text("Hello world"), None);
        assert_eq!(window_changed_text("Hello\nWINDOW_CHANGED"), None);
        assert_eq!(window_changed_text("WINDOW_CHANGED"), Some(""));
    }

    #[test]
    fn test_indicator_json_shape() {
        let indicator = Indicator::for_state(AppState::Error);
        let json = serde_json::to_value(&indicator).unwrap();
        assert_eq!(json["class"], "error");
        assert_eq!(json["alt"], "error");
        assert_eq!(json["text"], "dialog-warning-symbolic");
    }

    #[test]
    fn test_every_state_has_distinct_icon() {
        let states = [
            AppState::Idle,
            AppState::Recording,
            AppState::Processing,
            AppState::Typing,
            AppState::Error,
        ];
        let mut icons: Vec<_> = states.iter().map(|s| icon_name(*s)).collect();
        icons.sort();
        icons.dedup();
        assert_eq!(icons.len(), states.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_state_stops_animation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut presenter, rx) = DesktopPresenter::new(dir.path().join("config.json"));

        presenter.present_icon(AppState::Processing);
        tokio::time::sleep(FRAME_INTERVAL * 3).await;
        assert!(rx.borrow().alt.starts_with("loading-"));

        presenter.clear_effects(AppState::Processing);
        presenter.present_icon(AppState::Idle);
        tokio::time::sleep(FRAME_INTERVAL * 3).await;
        assert_eq!(rx.borrow().alt, "idle");
        assert_eq!(rx.borrow().text, "audio-input-microphone-symbolic");
    }

    #[test]
    fn test_file_config_snapshot_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let source = FileConfig::new(path.clone());

        assert!(source.snapshot().unwrap().openai_api_key.is_empty());

        std::fs::write(&path, r#"{"openai_api_key": "sk-later"}"#).unwrap();
        assert_eq!(source.snapshot().unwrap().openai_api_key, "sk-later");
    }
}
