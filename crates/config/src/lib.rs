use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

/// Which external provider family backs the STT and LLM collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderMode {
    Aws,
    Openai,
    Google,
}

/// Process-wide settings, loaded from the environment.
///
/// Every field has a default so a bare environment still deserializes; the
/// only hard requirement is an API key for the selected provider mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_provider_mode")]
    pub provider_mode: ProviderMode,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Comma-separated in the environment (CORS_ORIGINS). "*" allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_language_code")]
    pub transcribe_language_code: String,
    #[serde(default = "default_sample_rate")]
    pub transcribe_sample_rate: u32,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_api_base")]
    pub openai_api_base: String,
    #[serde(default = "default_openai_stt_model")]
    pub openai_stt_model: String,
    #[serde(default = "default_openai_translation_model")]
    pub openai_translation_model: String,
    /// Overrides the language hint sent to the realtime STT session.
    #[serde(default)]
    pub openai_stt_language: Option<String>,
    #[serde(default = "default_commit_interval_ms")]
    pub openai_commit_interval_ms: u64,
    #[serde(default = "default_correction_enabled")]
    pub llm_correction_enabled: bool,
    #[serde(default = "default_correction_batch_size")]
    pub llm_correction_batch_size: usize,
    #[serde(default = "default_correction_interval_ms")]
    pub llm_correction_interval_ms: u64,
    #[serde(default = "default_aws_region")]
    pub aws_region: String,
}

impl Settings {
    /// Loads settings from the process environment (plus whatever the caller
    /// already merged in via dotenv).
    pub fn load() -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(
                Environment::default()
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_origins"),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_mode == ProviderMode::Openai
            && self.openai_api_key.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::Message(
                "OPENAI_API_KEY is required when PROVIDER_MODE is OPENAI".into(),
            ));
        }
        if self.provider_mode == ProviderMode::Aws && self.aws_region.is_empty() {
            return Err(ConfigError::Message(
                "AWS_REGION is required when PROVIDER_MODE is AWS".into(),
            ));
        }
        Ok(())
    }

    /// The short language code handed to the realtime STT session.
    pub fn stt_language(&self) -> String {
        if let Some(lang) = self.openai_stt_language.as_deref()
            && !lang.is_empty()
        {
            return lang.to_string();
        }
        map_language_code(&self.transcribe_language_code)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_mode: default_provider_mode(),
            listen_addr: default_listen_addr(),
            cors_origins: default_cors_origins(),
            transcribe_language_code: default_language_code(),
            transcribe_sample_rate: default_sample_rate(),
            openai_api_key: None,
            openai_api_base: default_openai_api_base(),
            openai_stt_model: default_openai_stt_model(),
            openai_translation_model: default_openai_translation_model(),
            openai_stt_language: None,
            openai_commit_interval_ms: default_commit_interval_ms(),
            llm_correction_enabled: default_correction_enabled(),
            llm_correction_batch_size: default_correction_batch_size(),
            llm_correction_interval_ms: default_correction_interval_ms(),
            aws_region: default_aws_region(),
        }
    }
}

/// Maps a BCP-47 style code ("en-US") to the short form the realtime STT
/// session expects ("en"). Unknown codes fall back to the primary subtag.
pub fn map_language_code(language_code: &str) -> String {
    match language_code {
        "en-US" | "en-GB" => "en".to_string(),
        "ko-KR" => "ko".to_string(),
        "ja-JP" => "ja".to_string(),
        other => other
            .split('-')
            .next()
            .unwrap_or(other)
            .to_string(),
    }
}

fn default_provider_mode() -> ProviderMode {
    ProviderMode::Openai
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_stt_model() -> String {
    "gpt-4o-transcribe".to_string()
}

fn default_openai_translation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_commit_interval_ms() -> u64 {
    1_000
}

fn default_correction_enabled() -> bool {
    true
}

fn default_correction_batch_size() -> usize {
    5
}

fn default_correction_interval_ms() -> u64 {
    5_000
}

fn default_aws_region() -> String {
    "ap-northeast-2".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_language_codes() {
        assert_eq!(map_language_code("en-US"), "en");
        assert_eq!(map_language_code("en-GB"), "en");
        assert_eq!(map_language_code("ko-KR"), "ko");
        assert_eq!(map_language_code("ja-JP"), "ja");
    }

    #[test]
    fn unknown_codes_fall_back_to_primary_subtag() {
        assert_eq!(map_language_code("de-DE"), "de");
        assert_eq!(map_language_code("fr"), "fr");
    }

    #[test]
    fn openai_mode_requires_api_key() {
        let settings = Settings::default();
        assert!(settings.validate().is_err());

        let settings = Settings {
            openai_api_key: Some("sk-test".to_string()),
            ..Settings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn stt_language_prefers_explicit_override() {
        let settings = Settings {
            openai_stt_language: Some("ko".to_string()),
            ..Settings::default()
        };
        assert_eq!(settings.stt_language(), "ko");

        let settings = Settings::default();
        assert_eq!(settings.stt_language(), "en");
    }
}
