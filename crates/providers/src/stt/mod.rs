pub mod openai;

use meetbridge_config::{ProviderMode, Settings};
use meetbridge_core::{SttClient, SttFactory};

use crate::ProviderError;

pub fn create_stt_client(settings: &Settings) -> Result<Box<dyn SttClient>, ProviderError> {
    match settings.provider_mode {
        ProviderMode::Openai => Ok(Box::new(openai::OpenAiSttClient::new(settings)?)),
        ProviderMode::Aws => Err(ProviderError::Unsupported("AWS Transcribe streaming")),
        ProviderMode::Google => Err(ProviderError::Unsupported("Google STT")),
    }
}

/// Builds one STT client per session from the process-wide settings.
pub struct ProviderSttFactory {
    settings: Settings,
}

impl ProviderSttFactory {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl SttFactory for ProviderSttFactory {
    fn create(&self) -> anyhow::Result<Box<dyn SttClient>> {
        create_stt_client(&self.settings).map_err(Into::into)
    }
}
