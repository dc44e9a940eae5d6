use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::{Config, CustomPrompt, is_valid};
use crate::helper::{HelperEnv, HelperHandle, HelperLauncher, OutcomeKind, Termination, interpret};
use crate::messages::{AppState, Event, SessionId, Trigger};
use crate::presenter::{ConfigSource, NOTIFY_TITLE, Presenter};
use crate::typing::TextInjector;
use crate::watchdog::Watchdog;

/// One helper process from spawn to exit.
struct Session {
    id: SessionId,
    helper: HelperHandle,
    prompt: Option<CustomPrompt>,
    config: Config,
}

impl Session {
    fn watchdog_timeout(&self) -> Duration {
        let timeout = self.config.watchdog_timeout();
        // Prompt sessions make a chat request after transcribing.
        if self.prompt.is_some() {
            timeout * 2
        } else {
            timeout
        }
    }
}

/// The recording supervisor.
///
/// All methods run on the event loop thread and never block; helper exits,
/// watchdog timeouts and typing results come back in as [`Event`]s.
pub struct App<P: Presenter> {
    state: AppState,
    presenter: P,
    config: Box<dyn ConfigSource>,
    launcher: Box<dyn HelperLauncher>,
    injector: Arc<dyn TextInjector>,
    events: mpsc::Sender<Event>,
    watchdog: Watchdog,
    session: Option<Session>,
    typing: Option<SessionId>,
    error_message: Option<String>,
    next_session: u64,
    terminated: bool,
}

impl<P: Presenter> App<P> {
    pub fn new(
        presenter: P,
        config: Box<dyn ConfigSource>,
        launcher: Box<dyn HelperLauncher>,
        injector: Arc<dyn TextInjector>,
        events: mpsc::Sender<Event>,
    ) -> Self {
        let mut app = Self {
            state: AppState::Idle,
            presenter,
            config,
            launcher,
            injector,
            watchdog: Watchdog::new(events.clone()),
            events,
            session: None,
            typing: None,
            error_message: None,
            next_session: 0,
            terminated: false,
        };
        app.presenter.present_icon(AppState::Idle);
        app
    }

    pub fn handle_trigger(&mut self, trigger: Trigger) {
        if self.terminated {
            return;
        }
        tracing::debug!(state = ?self.state, ?trigger, "Trigger");

        match self.state {
            AppState::Idle => {
                let prompt = match trigger {
                    Trigger::Click => None,
                    Trigger::Prompt(index) => Some(index),
                };
                self.start_session(prompt);
            }
            AppState::Recording => self.stop_recording(),
            AppState::Processing => self.cancel(),
            AppState::Typing => tracing::debug!("Typing in progress, ignoring trigger"),
            AppState::Error => self.dismiss_error(),
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        if self.terminated {
            return;
        }

        match event {
            Event::HelperExited {
                session,
                termination,
            } => self.on_helper_exited(session, termination),
            Event::WatchdogFired(session) => self.on_watchdog_fired(session),
            Event::TypingFinished { session, result } => self.on_typing_finished(session, result),
        }
    }

    /// Start a recording session. Refused unless idle. Returns whether a
    /// helper was spawned.
    pub fn start_session(&mut self, prompt: Option<usize>) -> bool {
        if self.state != AppState::Idle || self.session.is_some() {
            tracing::warn!(state = ?self.state, "Refusing to start a second session");
            return false;
        }

        let config = match self.config.snapshot() {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to read configuration: {:#}", e);
                self.presenter
                    .notify(NOTIFY_TITLE, "Settings could not be read");
                self.presenter.open_configuration();
                return false;
            }
        };

        // The file may have been edited since startup.
        if let Err(e) = config.validate() {
            tracing::warn!("Configuration rejected: {}", e);
            self.presenter
                .notify(NOTIFY_TITLE, &format!("Settings are invalid: {}", e));
            self.presenter.open_configuration();
            return false;
        }

        let Some(mode) = config.mode().filter(|_| is_valid(&config)) else {
            tracing::warn!(mode = %config.whisper_mode, "Transcription backend not configured");
            self.presenter
                .notify(NOTIFY_TITLE, "Settings are not configured");
            self.presenter.open_configuration();
            return false;
        };

        let prompt = prompt.and_then(|index| {
            let found = config.custom_prompts.get(index).cloned();
            if found.is_none() {
                tracing::warn!(index, "No such custom prompt, recording without one");
            }
            found
        });

        let env = HelperEnv::for_session(&config, mode, prompt.as_ref());
        self.next_session += 1;
        let id = SessionId(self.next_session);

        match self.launcher.launch(id, &config.script_path, &env) {
            Ok(helper) => {
                tracing::info!(
                    session = %id,
                    pid = helper.pid(),
                    prompt = prompt.as_ref().map(|p| p.name.as_str()),
                    "Recording started"
                );
                self.session = Some(Session {
                    id,
                    helper,
                    prompt,
                    config,
                });
                self.set_state(AppState::Recording);
                true
            }
            Err(e) => {
                tracing::error!("Failed to launch helper: {}", e);
                self.fail(format!("Failed to start voice input: {}", e));
                false
            }
        }
    }

    fn stop_recording(&mut self) {
        let Some(session) = &self.session else {
            tracing::warn!("Recording without a session, resetting");
            self.set_state(AppState::Idle);
            return;
        };

        tracing::info!(session = %session.id, "Stopping recording");
        session.helper.stop();
        let (id, timeout) = (session.id, session.watchdog_timeout());

        self.set_state(AppState::Processing);
        self.watchdog.start(id, timeout);
    }

    /// User abort while processing. Silent.
    fn cancel(&mut self) {
        self.watchdog.cancel();
        if let Some(session) = self.session.take() {
            tracing::info!(session = %session.id, "Transcription cancelled by user");
            session.helper.kill();
        }
        self.set_state(AppState::Idle);
    }

    fn dismiss_error(&mut self) {
        let message = self
            .error_message
            .clone()
            .unwrap_or_else(|| "Unknown error".to_string());
        self.presenter.present_error(&message);
        self.set_state(AppState::Idle);
    }

    fn on_helper_exited(&mut self, id: SessionId, termination: Termination) {
        if self.session.as_ref().map(|s| s.id) != Some(id) {
            tracing::debug!(session = %id, "Ignoring exit of a stale helper");
            return;
        }

        self.watchdog.cancel();
        let Some(session) = self.session.take() else {
            return;
        };

        let outcome = interpret(
            termination.code,
            &termination.stdout,
            &termination.stderr,
            session.config.helper_protocol,
        );
        tracing::info!(session = %id, kind = ?outcome.kind, "Helper finished");

        match outcome.kind {
            OutcomeKind::Success => {
                if let Some(text) = &outcome.stdout {
                    self.presenter.present_result(text);
                }
                self.set_state(AppState::Idle);
            }
            OutcomeKind::Cancelled => self.set_state(AppState::Idle),
            OutcomeKind::ConfigError => {
                self.presenter.notify(
                    NOTIFY_TITLE,
                    "Configuration error, please check settings",
                );
                self.set_state(AppState::Idle);
            }
            OutcomeKind::Timeout => {
                self.presenter
                    .notify(NOTIFY_TITLE, "Maximum recording time reached");
                self.set_state(AppState::Idle);
            }
            OutcomeKind::NeedsTyping => match outcome.stdout {
                Some(text) => {
                    let timeout = session.config.watchdog_timeout();
                    self.start_typing(id, text, session.config.paste_method, timeout)
                }
                None => {
                    tracing::warn!("Helper asked for typing without any text");
                    self.set_state(AppState::Idle);
                }
            },
            OutcomeKind::RecordingError
            | OutcomeKind::TranscriptionError
            | OutcomeKind::ChatError
            | OutcomeKind::Unknown(_) => {
                let message = outcome
                    .error_message()
                    .unwrap_or_else(|| "Voice input failed".to_string());
                self.fail(message);
            }
        }
    }

    fn on_watchdog_fired(&mut self, id: SessionId) {
        if !self.watchdog.fired(id) {
            tracing::debug!(session = %id, "Ignoring stale watchdog");
            return;
        }

        if self.state != AppState::Processing || self.session.as_ref().map(|s| s.id) != Some(id) {
            return;
        }

        tracing::warn!(session = %id, "Helper did not respond in time, cancelling");
        if let Some(session) = self.session.take() {
            session.helper.kill();
        }
        self.set_state(AppState::Idle);
        self.presenter.notify(
            NOTIFY_TITLE,
            "Server did not respond, transcription cancelled",
        );
    }

    /// Hand the text to the injector. A hung paste tool is abandoned after
    /// `timeout` so `Typing` always resolves.
    fn start_typing(
        &mut self,
        id: SessionId,
        text: String,
        paste_method: String,
        timeout: Duration,
    ) {
        self.typing = Some(id);
        self.set_state(AppState::Typing);

        let injector = self.injector.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let typed = injector.inject(text, &paste_method);
            let result = match tokio::time::timeout(timeout, typed).await {
                Ok(result) => result.map_err(|e| format!("{:#}", e)),
                Err(_) => Err(format!("Typing timed out after {}s", timeout.as_secs())),
            };
            if events
                .send(Event::TypingFinished {
                    session: id,
                    result,
                })
                .await
                .is_err()
            {
                tracing::debug!("Event loop closed before typing {} finished", id);
            }
        });
    }

    fn on_typing_finished(&mut self, id: SessionId, result: Result<(), String>) {
        if self.typing != Some(id) {
            return;
        }
        self.typing = None;

        match result {
            Ok(()) => self.set_state(AppState::Idle),
            Err(e) => {
                tracing::error!("Typing failed: {}", e);
                self.fail(format!("Typing failed\n\n{}", e));
            }
        }
    }

    fn fail(&mut self, message: String) {
        let summary = message.lines().next().unwrap_or("Voice input failed").to_string();
        self.error_message = Some(message);
        self.presenter.notify(NOTIFY_TITLE, &summary);
        self.set_state(AppState::Error);
    }

    /// Leave the current state's effects, switch, then enter the new one.
    fn set_state(&mut self, next: AppState) {
        let previous = self.state;
        self.presenter.clear_effects(previous);

        self.state = next;
        if next == AppState::Idle {
            self.error_message = None;
        }

        self.presenter.present_icon(next);
        tracing::info!(from = ?previous, to = ?next, "State changed");
    }

    /// Release the watchdog and any running helper. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.watchdog.cancel();
        if let Some(session) = self.session.take() {
            tracing::info!(session = %session.id, "Killing helper on shutdown");
            session.helper.kill();
        }
        self.typing = None;

        if !self.terminated {
            self.presenter.clear_effects(self.state);
            self.terminated = true;
            tracing::info!("Supervisor stopped");
        }
    }
}

#[cfg(test)]
impl<P: Presenter> App<P> {
    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn watchdog_armed(&self) -> bool {
        self.watchdog.armed_for().is_some()
    }
}

impl<P: Presenter> Drop for App<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
