use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::shortcuts;

/// Transcription backend the helper talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionMode {
    OpenAi,
    Local,
}

impl TranscriptionMode {
    pub fn parse(mode: &str) -> Option<Self> {
        match mode {
            "openai" => Some(Self::OpenAi),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Local => "local",
        }
    }
}

/// Which meaning the helper gives to exit code 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HelperProtocol {
    /// Exit code 6: the AI chat post-processing step failed.
    #[default]
    Chat,
    /// Exit code 6: text is ready on stdout and must be typed by us.
    Typing,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CustomPrompt {
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub shortcut: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Kept as a string so unknown modes survive parsing and are rejected by [`is_valid`].
    #[serde(default = "default_whisper_mode")]
    pub whisper_mode: String,

    #[serde(default)]
    pub openai_api_key: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default)]
    pub local_url: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Maximum recording length in seconds, enforced by the helper.
    #[serde(default = "default_recording_duration")]
    pub recording_duration: u64,

    #[serde(default = "default_script_path")]
    pub script_path: String,

    #[serde(default = "default_paste_method")]
    pub paste_method: String,

    #[serde(default)]
    pub chat_model: Option<String>,

    #[serde(default)]
    pub custom_prompts: Vec<CustomPrompt>,

    /// Seconds to wait for a result after recording stops.
    #[serde(default = "default_watchdog_timeout")]
    pub watchdog_timeout: u64,

    #[serde(default)]
    pub helper_protocol: HelperProtocol,

    #[serde(default = "default_shortcut")]
    pub primary_shortcut: String,
}

fn default_whisper_mode() -> String {
    "openai".to_string()
}

fn default_openai_model() -> String {
    "whisper-1".to_string()
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_recording_duration() -> u64 {
    300
}

fn default_script_path() -> String {
    "whisper-voice-input".to_string()
}

fn default_paste_method() -> String {
    "ctrl_shift".to_string()
}

fn default_watchdog_timeout() -> u64 {
    30
}

fn default_shortcut() -> String {
    "SUPER+ALT+D".to_string()
}

pub const PASTE_METHODS: [&str; 3] = ["super", "ctrl_shift", "ctrl"];

impl Default for Config {
    fn default() -> Self {
        Self {
            whisper_mode: default_whisper_mode(),
            openai_api_key: String::new(),
            openai_model: default_openai_model(),
            local_url: String::new(),
            language: default_language(),
            recording_duration: default_recording_duration(),
            script_path: default_script_path(),
            paste_method: default_paste_method(),
            chat_model: None,
            custom_prompts: Vec::new(),
            watchdog_timeout: default_watchdog_timeout(),
            helper_protocol: HelperProtocol::default(),
            primary_shortcut: default_shortcut(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("script_path cannot be empty")]
    EmptyScriptPath,
    #[error("paste_method must be one of: super, ctrl_shift, ctrl")]
    UnknownPasteMethod,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("custom prompt {index} has an empty {field}")]
    IncompletePrompt { index: usize, field: &'static str },
    #[error("invalid shortcut {shortcut:?}: {reason}")]
    BadShortcut { shortcut: String, reason: String },
}

impl Config {
    /// Load configuration from `config_path`, writing defaults there first
    /// if it does not exist yet.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("voicekey").join("config.json"))
    }

    /// Structural checks run once at startup. Credentials are not checked
    /// here, see [`is_valid`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.script_path.trim().is_empty() {
            return Err(ConfigError::EmptyScriptPath);
        }

        if !PASTE_METHODS.contains(&self.paste_method.as_str()) {
            return Err(ConfigError::UnknownPasteMethod);
        }

        if self.recording_duration == 0 {
            return Err(ConfigError::ZeroDuration("recording_duration"));
        }

        if self.watchdog_timeout == 0 {
            return Err(ConfigError::ZeroDuration("watchdog_timeout"));
        }

        for (index, prompt) in self.custom_prompts.iter().enumerate() {
            if prompt.name.trim().is_empty() {
                return Err(ConfigError::IncompletePrompt { index, field: "name" });
            }
            if prompt.prompt.trim().is_empty() {
                return Err(ConfigError::IncompletePrompt { index, field: "prompt" });
            }
        }

        let shortcuts = std::iter::once(&self.primary_shortcut)
            .chain(self.custom_prompts.iter().filter_map(|p| p.shortcut.as_ref()));
        for shortcut in shortcuts {
            shortcuts::parse_shortcut(shortcut).map_err(|e| ConfigError::BadShortcut {
                shortcut: shortcut.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    pub fn mode(&self) -> Option<TranscriptionMode> {
        TranscriptionMode::parse(&self.whisper_mode)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout)
    }
}

/// Whether the selected backend has what it needs to transcribe.
pub fn is_valid(config: &Config) -> bool {
    match config.mode() {
        Some(TranscriptionMode::OpenAi) => !config.openai_api_key.trim().is_empty(),
        Some(TranscriptionMode::Local) => !config.local_url.trim().is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_mode(mode: &str, key: &str, url: &str) -> Config {
        Config {
            whisper_mode: mode.to_string(),
            openai_api_key: key.to_string(),
            local_url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_openai_requires_non_blank_key() {
        for key in ["", " ", "\t\n", "   "] {
            assert!(!is_valid(&with_mode("openai", key, "http://localhost:9000")));
        }
        for key in ["sk-test", "  sk-padded  ", "x"] {
            assert!(is_valid(&with_mode("openai", key, "")));
        }
    }

    #[test]
    fn test_local_requires_non_blank_url() {
        for url in ["", "  ", "\n"] {
            assert!(!is_valid(&with_mode("local", "sk-test", url)));
        }
        assert!(is_valid(&with_mode("local", "", "http://localhost:9000/asr")));
    }

    #[test]
    fn test_unknown_mode_is_never_valid() {
        assert!(!is_valid(&with_mode("azure", "sk-test", "http://x")));
        assert!(!is_valid(&with_mode("", "sk-test", "http://x")));
        assert!(!is_valid(&with_mode("OpenAI", "sk-test", "http://x")));
    }

    #[test]
    fn test_default_config_is_well_formed_but_unconfigured() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert!(!is_valid(&config));
        assert_eq!(config.helper_protocol, HelperProtocol::Chat);
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let config = Config {
            paste_method: "shift".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::UnknownPasteMethod));

        let config = Config {
            watchdog_timeout: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("watchdog_timeout"))
        );

        let config = Config {
            custom_prompts: vec![CustomPrompt {
                name: "Translate".to_string(),
                prompt: " ".to_string(),
                shortcut: None,
            }],
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::IncompletePrompt { index: 0, field: "prompt" })
        );

        let config = Config {
            primary_shortcut: "SUPER+NOPE".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadShortcut { .. })
        ));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"whisper_mode": "local", "local_url": "http://srv"}"#)
                .unwrap();
        assert_eq!(config.mode(), Some(TranscriptionMode::Local));
        assert_eq!(config.recording_duration, 300);
        assert_eq!(config.watchdog_timeout(), Duration::from_secs(30));
        assert!(is_valid(&config));
    }

    #[test]
    fn test_protocol_field_parses() {
        let config: Config = serde_json::from_str(r#"{"helper_protocol": "typing"}"#).unwrap();
        assert_eq!(config.helper_protocol, HelperProtocol::Typing);
        assert!(serde_json::from_str::<Config>(r#"{"helper_protocol": "v3"}"#).is_err());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voicekey").join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.whisper_mode, "openai");

        let mut edited = config.clone();
        edited.openai_api_key = "sk-saved".to_string();
        edited.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.openai_api_key, "sk-saved");
    }
}
