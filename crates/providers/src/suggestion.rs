use async_trait::async_trait;
use serde_json::Value;

use meetbridge_core::{SuggestionItem, Suggester, TranscriptEntry};

use crate::translation::openai::OpenAiChatClient;

const MAX_SUGGESTIONS: usize = 5;
const CONTEXT_TRANSCRIPTS: usize = 10;

/// Generates meeting phrase suggestions from recent transcripts via one chat
/// completion, with a tolerant parser for the model's response.
pub struct LlmSuggester {
    chat: OpenAiChatClient,
    model: String,
}

impl LlmSuggester {
    pub fn new(chat: OpenAiChatClient, model: &str) -> Self {
        Self {
            chat,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Suggester for LlmSuggester {
    async fn generate(
        &self,
        recent_transcripts: &[TranscriptEntry],
        system_prompt: Option<&str>,
    ) -> anyhow::Result<Vec<SuggestionItem>> {
        let prompt = build_suggestion_prompt(recent_transcripts, system_prompt);
        let response = self.chat.complete(&self.model, None, &prompt).await?;
        Ok(parse_suggestions(&response))
    }
}

fn build_suggestion_prompt(
    transcripts: &[TranscriptEntry],
    system_prompt: Option<&str>,
) -> String {
    let start = transcripts.len().saturating_sub(CONTEXT_TRANSCRIPTS);
    let context_lines: Vec<String> = transcripts[start..]
        .iter()
        .map(|entry| format!("- {}: {}", entry.speaker, entry.text))
        .collect();

    let prompt_prefix = system_prompt
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .map(|prompt| {
            format!(
                "Use the following system prompt to guide the suggestions.\nSystem prompt:\n{prompt}\n\n"
            )
        })
        .unwrap_or_default();

    format!(
        "{prompt_prefix}You are helping a non-native speaker participate in a meeting. \
         Suggest 5 short, natural English sentences they can say. Mix questions and answers.\n\
         Rules:\n\
         - Use simple, easy-to-edit phrases.\n\
         - Keep each sentence under 12 words.\n\
         - Avoid jargon and idioms.\n\
         - Make them sound polite and natural.\n\
         Return a JSON array of objects with keys \"source\" and \"target\" only.\n\
         Context:\n{}",
        context_lines.join("\n")
    )
}

/// Parses the model response: a JSON array of `{source, target}` objects,
/// possibly wrapped in prose; falls back to `source | target` (or
/// `source - target`) lines. Returns at most five items.
pub(crate) fn parse_suggestions(response: &str) -> Vec<SuggestionItem> {
    let response = response.trim();
    if response.is_empty() {
        return Vec::new();
    }

    if let Some(items) = try_parse_json_array(response) {
        return items;
    }

    let mut suggestions = Vec::new();
    for line in response.lines() {
        let line = line.trim().trim_start_matches('-').trim();
        if line.is_empty() {
            continue;
        }
        let Some((source, target)) = line
            .split_once('|')
            .or_else(|| line.split_once('-'))
        else {
            continue;
        };
        let source = source.trim();
        let target = target.trim();
        if !source.is_empty() && !target.is_empty() {
            suggestions.push(SuggestionItem {
                source: source.to_string(),
                target: target.to_string(),
            });
        }
    }
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

fn try_parse_json_array(response: &str) -> Option<Vec<SuggestionItem>> {
    let value = serde_json::from_str::<Value>(response).ok().or_else(|| {
        let start = response.find('[')?;
        let end = response.rfind(']')?;
        if start >= end {
            return None;
        }
        serde_json::from_str(&response[start..=end]).ok()
    })?;

    let array = value.as_array()?;
    let mut items = Vec::new();
    for entry in array {
        let source = entry
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        let target = entry
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        if !source.is_empty() && !target.is_empty() {
            items.push(SuggestionItem {
                source: source.to_string(),
                target: target.to_string(),
            });
        }
    }
    items.truncate(MAX_SUGGESTIONS);
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_json_array() {
        let items = parse_suggestions(
            r#"[{"source": "Could you repeat that?", "target": "다시 말씀해 주시겠어요?"}]"#,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, "Could you repeat that?");
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let items = parse_suggestions(
            "Here are some ideas:\n[{\"source\": \"Sounds good.\", \"target\": \"좋아요.\"}]\nEnjoy!",
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].target, "좋아요.");
    }

    #[test]
    fn caps_at_five_items() {
        let entries: Vec<String> = (0..8)
            .map(|index| format!(r#"{{"source": "s{index}", "target": "t{index}"}}"#))
            .collect();
        let items = parse_suggestions(&format!("[{}]", entries.join(",")));
        assert_eq!(items.len(), 5);
    }

    #[test]
    fn skips_entries_with_missing_fields() {
        let items = parse_suggestions(
            r#"[{"source": "only source"}, {"source": "ok", "target": "좋아"}]"#,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, "ok");
    }

    #[test]
    fn falls_back_to_pipe_separated_lines() {
        let items = parse_suggestions(
            "Could you clarify? | 명확히 해주시겠어요?\nLet's move on. | 넘어가시죠.",
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].source, "Let's move on.");
    }

    #[test]
    fn empty_response_yields_nothing() {
        assert!(parse_suggestions("").is_empty());
        assert!(parse_suggestions("   ").is_empty());
    }

    #[test]
    fn prompt_includes_context_and_optional_system_prompt() {
        let transcripts = vec![TranscriptEntry {
            speaker: "spk_1".to_string(),
            ts: 100,
            text: "We should ship on Friday.".to_string(),
        }];
        let prompt = build_suggestion_prompt(&transcripts, Some("Focus on scheduling"));
        assert!(prompt.contains("- spk_1: We should ship on Friday."));
        assert!(prompt.starts_with("Use the following system prompt"));

        let prompt = build_suggestion_prompt(&transcripts, None);
        assert!(prompt.starts_with("You are helping a non-native speaker"));
    }
}
