pub mod stt;
pub mod suggestion;
pub mod translation;

use std::sync::Arc;

use thiserror::Error;

use meetbridge_config::{ProviderMode, Settings};
use meetbridge_core::{Corrector, SttFactory, Suggester, Translator};

use translation::openai::{OpenAiChatClient, OpenAiTranslator};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is planned for a future release")]
    Unsupported(&'static str),
    #[error("OPENAI_API_KEY is required when PROVIDER_MODE is OPENAI")]
    MissingApiKey,
}

fn openai_chat_client(settings: &Settings) -> Result<OpenAiChatClient, ProviderError> {
    let api_key = settings
        .openai_api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or(ProviderError::MissingApiKey)?;
    Ok(OpenAiChatClient::new(&settings.openai_api_base, api_key))
}

pub fn create_translator(settings: &Settings) -> Result<Arc<dyn Translator>, ProviderError> {
    match settings.provider_mode {
        ProviderMode::Openai => Ok(Arc::new(OpenAiTranslator::new(
            openai_chat_client(settings)?,
            &settings.openai_translation_model,
        ))),
        ProviderMode::Aws => Err(ProviderError::Unsupported("AWS Bedrock translation")),
        ProviderMode::Google => Err(ProviderError::Unsupported("Google translation")),
    }
}

pub fn create_corrector(settings: &Settings) -> Result<Arc<dyn Corrector>, ProviderError> {
    match settings.provider_mode {
        ProviderMode::Openai => Ok(Arc::new(OpenAiTranslator::new(
            openai_chat_client(settings)?,
            &settings.openai_translation_model,
        ))),
        ProviderMode::Aws => Err(ProviderError::Unsupported("AWS Bedrock correction")),
        ProviderMode::Google => Err(ProviderError::Unsupported("Google correction")),
    }
}

pub fn create_suggester(settings: &Settings) -> Result<Arc<dyn Suggester>, ProviderError> {
    match settings.provider_mode {
        ProviderMode::Openai => Ok(Arc::new(suggestion::LlmSuggester::new(
            openai_chat_client(settings)?,
            &settings.openai_translation_model,
        ))),
        ProviderMode::Aws => Err(ProviderError::Unsupported("AWS Bedrock suggestions")),
        ProviderMode::Google => Err(ProviderError::Unsupported("Google suggestions")),
    }
}

pub fn create_stt_factory(settings: &Settings) -> Result<Arc<dyn SttFactory>, ProviderError> {
    match settings.provider_mode {
        ProviderMode::Openai => {
            if settings
                .openai_api_key
                .as_deref()
                .is_none_or(str::is_empty)
            {
                return Err(ProviderError::MissingApiKey);
            }
            Ok(Arc::new(stt::ProviderSttFactory::new(settings.clone())))
        }
        ProviderMode::Aws => Err(ProviderError::Unsupported("AWS Transcribe streaming")),
        ProviderMode::Google => Err(ProviderError::Unsupported("Google STT")),
    }
}
