use crate::config::HelperProtocol;

/// How the helper process ended, as collected by the completion watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    /// Exit code, or `128 + signal` when the helper was killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CONFIG_ERROR: i32 = 1;
pub const EXIT_RECORDING_ERROR: i32 = 2;
pub const EXIT_TRANSCRIPTION_ERROR: i32 = 3;
pub const EXIT_CANCELLED: i32 = 4;
pub const EXIT_TIMEOUT: i32 = 5;
pub const EXIT_CHAT_OR_TYPING: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    ConfigError,
    RecordingError,
    TranscriptionError,
    Cancelled,
    /// The helper hit the maximum recording duration.
    Timeout,
    ChatError,
    NeedsTyping,
    Unknown(i32),
}

/// Decoded meaning of a helper exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    pub kind: OutcomeKind,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Map an exit code and captured output to an outcome.
///
/// The code table is the wire contract with the helper script. Code 6 is
/// the only protocol-dependent entry.
pub fn interpret(code: i32, stdout: &str, stderr: &str, protocol: HelperProtocol) -> ExitOutcome {
    let kind = match code {
        EXIT_SUCCESS => OutcomeKind::Success,
        EXIT_CONFIG_ERROR => OutcomeKind::ConfigError,
        EXIT_RECORDING_ERROR => OutcomeKind::RecordingError,
        EXIT_TRANSCRIPTION_ERROR => OutcomeKind::TranscriptionError,
        EXIT_CANCELLED => OutcomeKind::Cancelled,
        EXIT_TIMEOUT => OutcomeKind::Timeout,
        EXIT_CHAT_OR_TYPING => match protocol {
            HelperProtocol::Chat => OutcomeKind::ChatError,
            HelperProtocol::Typing => OutcomeKind::NeedsTyping,
        },
        other => OutcomeKind::Unknown(other),
    };

    ExitOutcome {
        kind,
        stdout: payload(stdout),
        stderr: non_blank(stderr),
    }
}

/// Stdout as the helper wrote it, minus the final line break. Whitespace
/// inside is part of the text to type.
fn payload(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    let text = text.strip_suffix('\n').unwrap_or(text);
    Some(text.strip_suffix('\r').unwrap_or(text).to_string())
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl ExitOutcome {
    /// Message stored for the error dialog, for outcomes that end in `Error`.
    pub fn error_message(&self) -> Option<String> {
        let summary = match self.kind {
            OutcomeKind::RecordingError => "Recording failed".to_string(),
            OutcomeKind::TranscriptionError => "Transcription failed".to_string(),
            OutcomeKind::ChatError => "AI chat processing failed".to_string(),
            OutcomeKind::Unknown(code) => format!("Process exited with code {}", code),
            _ => return None,
        };

        Some(match &self.stderr {
            Some(stderr) => format!("{}\n\n{}", summary, stderr),
            None => summary,
        })
    }
}
