use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::env::HelperEnv;
use super::outcome::Termination;
use crate::messages::{Event, SessionId};

/// How long to keep reading pipes after the helper exited. Grandchildren
/// that inherited stdout could otherwise keep them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to start {script}: {source}")]
    Spawn {
        script: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{script} exited before its pid could be read")]
    NoPid { script: String },
}

/// Requests the supervising task applies to a running helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperControl {
    /// SIGTERM: stop capturing audio and go on to transcribe.
    Stop,
    /// Forced termination; the result is discarded.
    Kill,
}

/// Handle for communicating with a running helper.
///
/// Dropping the handle kills the helper.
#[derive(Debug)]
pub struct HelperHandle {
    session: SessionId,
    pid: u32,
    control: mpsc::UnboundedSender<HelperControl>,
}

impl HelperHandle {
    pub fn new(session: SessionId, pid: u32, control: mpsc::UnboundedSender<HelperControl>) -> Self {
        Self {
            session,
            pid,
            control,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Ask the helper to finish recording. Does not wait.
    pub fn stop(&self) {
        if self.control.send(HelperControl::Stop).is_err() {
            tracing::debug!("Helper {} already gone, stop ignored", self.session);
        }
    }

    /// Terminate the helper without waiting for it.
    pub fn kill(&self) {
        if self.control.send(HelperControl::Kill).is_err() {
            tracing::debug!("Helper {} already gone, kill ignored", self.session);
        }
    }
}

/// Starts helper processes. Implementations must report each helper's
/// exit exactly once as [`Event::HelperExited`], unless it was killed.
pub trait HelperLauncher {
    fn launch(
        &self,
        session: SessionId,
        script_path: &str,
        env: &HelperEnv,
    ) -> Result<HelperHandle, LaunchError>;
}

/// Spawns real processes with tokio and supervises them on a task.
pub struct ProcessLauncher {
    events: mpsc::Sender<Event>,
}

impl ProcessLauncher {
    pub fn new(events: mpsc::Sender<Event>) -> Self {
        Self { events }
    }
}

impl HelperLauncher for ProcessLauncher {
    fn launch(
        &self,
        session: SessionId,
        script_path: &str,
        env: &HelperEnv,
    ) -> Result<HelperHandle, LaunchError> {
        let child = Command::new(script_path)
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                script: script_path.to_string(),
                source,
            })?;

        let pid = child.id().ok_or_else(|| LaunchError::NoPid {
            script: script_path.to_string(),
        })?;

        tracing::info!(session = %session, pid, script = script_path, "Helper started");

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(supervise(child, session, pid, control_rx, self.events.clone()));

        Ok(HelperHandle::new(session, pid, control_tx))
    }
}

/// Owns the child until it exits, then reports its termination.
async fn supervise(
    mut child: Child,
    session: SessionId,
    pid: u32,
    mut control: mpsc::UnboundedReceiver<HelperControl>,
    events: mpsc::Sender<Event>,
) {
    let stdout = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
    let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            cmd = control.recv() => match cmd {
                Some(HelperControl::Stop) => {
                    tracing::info!(session = %session, pid, "Sending SIGTERM to helper");
                    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                        tracing::warn!("Failed to signal helper {}: {}", pid, e);
                    }
                }
                Some(HelperControl::Kill) | None => {
                    tracing::info!(session = %session, pid, "Killing helper");
                    if let Err(e) = child.start_kill() {
                        tracing::warn!("Failed to kill helper {}: {}", pid, e);
                    }
                    // Reap it; nobody is waiting for the result anymore.
                    let _ = child.wait().await;
                    return;
                }
            }
        }
    };

    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            tracing::error!("Failed to wait on helper {}: {}", pid, e);
            -1
        }
    };

    let termination = Termination {
        code,
        stdout: collect(stdout).await,
        stderr: collect(stderr).await,
    };

    tracing::info!(session = %session, pid, code, "Helper exited");

    if events
        .send(Event::HelperExited {
            session,
            termination,
        })
        .await
        .is_err()
    {
        tracing::debug!("Event loop closed before helper {} exit was delivered", session);
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

async fn drain<R: AsyncRead + Unpin>(mut pipe: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        tracing::warn!("Failed to read helper output: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(reader: Option<JoinHandle<String>>) -> String {
    let Some(reader) = reader else {
        return String::new();
    };

    match tokio::time::timeout(DRAIN_GRACE, reader).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::warn!("Output reader task failed: {}", e);
            String::new()
        }
        Err(_) => {
            tracing::warn!("Helper output still open {:?} after exit, giving up", DRAIN_GRACE);
            String::new()
        }
    }
}
