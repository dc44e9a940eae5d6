use crate::config::{Config, CustomPrompt, TranscriptionMode};

pub const WHISPER_MODE: &str = "WHISPER_MODE";
pub const WHISPER_LANGUAGE: &str = "WHISPER_LANGUAGE";
pub const RECORDING_DURATION: &str = "RECORDING_DURATION";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const WHISPER_LOCAL_URL: &str = "WHISPER_LOCAL_URL";
pub const PASTE_METHOD: &str = "PASTE_METHOD";
pub const CUSTOM_PROMPT: &str = "CUSTOM_PROMPT";
pub const CHAT_MODEL: &str = "CHAT_MODEL";

/// Environment overlay passed to the helper on top of our own environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelperEnv {
    vars: Vec<(&'static str, String)>,
}

impl HelperEnv {
    /// Build the overlay for one session from a configuration snapshot.
    pub fn for_session(
        config: &Config,
        mode: TranscriptionMode,
        prompt: Option<&CustomPrompt>,
    ) -> Self {
        let mut env = Self::default();
        env.set(WHISPER_MODE, mode.as_str());
        env.set(WHISPER_LANGUAGE, &config.language);
        env.set(RECORDING_DURATION, config.recording_duration.to_string());

        match mode {
            TranscriptionMode::OpenAi => {
                env.set(OPENAI_API_KEY, config.openai_api_key.trim());
                env.set(OPENAI_MODEL, &config.openai_model);
            }
            TranscriptionMode::Local => {
                env.set(WHISPER_LOCAL_URL, config.local_url.trim());
            }
        }

        env.set(PASTE_METHOD, &config.paste_method);

        if let Some(prompt) = prompt {
            env.set(CUSTOM_PROMPT, &prompt.prompt);
            if let Some(model) = &config.chat_model {
                env.set(CHAT_MODEL, model);
            }
        }

        env
    }

    pub fn set(&mut self, key: &'static str, value: impl Into<String>) {
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.vars.push((key, value)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.vars.iter().map(|(k, v)| (*k, v.as_str()))
    }
}
