use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;

use meetbridge_core::{Corrector, Translator};

const FAST_SYSTEM_PROMPT: &str = "You are a translator. Translate English to natural Korean. \
     Return only the translation in Korean. Do not ask questions or add explanations.";

const CONTEXT_SYSTEM_PROMPT: &str = "You are a translator. Translate English to natural Korean. \
     Use context for coherence but translate only the current line. \
     If the line is unclear or incomplete, make the best possible inference. \
     Never ask questions, request more context, or mention language selection. \
     Respond in Korean only, without quotes or extra text. Return only the translation.";

const REVERSE_SYSTEM_PROMPT: &str =
    "You are a translator. Translate Korean to natural English. Return only the translation.";

/// Minimal chat-completions client shared by the translation, suggestion and
/// correction adapters.
#[derive(Clone)]
pub struct OpenAiChatClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(api_base: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn complete(
        &self,
        model: &str,
        system: Option<&str>,
        user: &str,
    ) -> anyhow::Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": user}));

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": 0.2,
            "max_tokens": 512,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat completion returned an error status")?
            .json::<ChatResponse>()
            .await
            .context("chat completion response was not valid JSON")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(content.trim().to_string())
    }
}

/// Chat-completions backed translator. Also serves as the corrector, since a
/// correction pass is just another single-prompt completion.
pub struct OpenAiTranslator {
    chat: OpenAiChatClient,
    model: String,
}

impl OpenAiTranslator {
    pub fn new(chat: OpenAiChatClient, model: &str) -> Self {
        Self {
            chat,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate_fast(&self, text: &str) -> anyhow::Result<String> {
        self.chat
            .complete(&self.model, Some(FAST_SYSTEM_PROMPT), text)
            .await
    }

    async fn translate_with_context(
        &self,
        text: &str,
        recent_context: Option<&[String]>,
    ) -> anyhow::Result<String> {
        let mut user_lines: Vec<String> = Vec::new();
        if let Some(context) = recent_context.filter(|entries| !entries.is_empty()) {
            user_lines.push("Recent context:".to_string());
            user_lines.extend(context.iter().map(|entry| format!("- {entry}")));
        }
        user_lines.push(format!("Current line: \"{text}\""));
        self.chat
            .complete(
                &self.model,
                Some(CONTEXT_SYSTEM_PROMPT),
                &user_lines.join("\n"),
            )
            .await
    }

    async fn translate_reverse(&self, text: &str) -> anyhow::Result<String> {
        self.chat
            .complete(&self.model, Some(REVERSE_SYSTEM_PROMPT), text)
            .await
    }
}

#[async_trait]
impl Corrector for OpenAiTranslator {
    async fn correct_batch(&self, prompt: &str) -> anyhow::Result<String> {
        self.chat.complete(&self.model, None, prompt).await
    }
}
