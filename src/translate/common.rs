use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::language;

/// One chunk of cue texts to translate
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest {
    pub chunk_index: usize,
    /// Cue texts in cue order; the reply must have the same number of lines
    pub lines: Vec<String>,
    /// ISO 639-1 code of the source text
    pub source_language: String,
    /// Target language name, e.g. "Polish"
    pub target_language: String,
    /// Style/context instructions repeated on every chunk
    pub context_prompt: Option<String>,
    pub model: String,
    pub temperature: f32,
}

/// Shape the model is asked to answer with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatedLines {
    pub lines: Vec<String>,
}

pub fn build_system_prompt(target_language: &str) -> String {
    format!(
        "You are a world class professional translator specialized in translating to {lang}.\n\
         You receive a JSON object with a \"lines\" array; every element is the text of one subtitle.\n\
         Translate every element to {lang} and reply with JSON only, as {{\"lines\": [...]}}.\n\
         The reply must contain exactly as many elements as the input, in the same order.\n\
         Never merge, split, skip or reorder elements, even if a sentence continues into the next subtitle.\n\
         Stick to {lang} grammar and punctuation rules.",
        lang = target_language
    )
}

pub fn build_user_prompt(request: &TranslationRequest) -> String {
    let payload = serde_json::json!({ "lines": request.lines });
    let mut prompt = format!(
        "Translate the following {} subtitles from {} to {}.\n{}",
        request.lines.len(),
        language::display_name(&request.source_language),
        request.target_language,
        payload
    );

    if let Some(context) = request.context_prompt.as_deref().map(str::trim) {
        if !context.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(context);
        }
    }
    prompt
}

/// Lines from a model reply, tolerating markdown fences and text around the JSON
pub fn parse_translated_lines(text: &str) -> Option<Vec<String>> {
    let text = text.trim();

    if let Ok(parsed) = serde_json::from_str::<TranslatedLines>(text) {
        return Some(parsed.lines);
    }

    let cleaned = remove_markdown_code_blocks(text);
    if cleaned != text {
        debug!("Removed markdown code block from reply");
        if let Ok(parsed) = serde_json::from_str::<TranslatedLines>(&cleaned) {
            return Some(parsed.lines);
        }
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<TranslatedLines>(&cleaned[start..=end])
        .ok()
        .map(|parsed| parsed.lines)
}

fn remove_markdown_code_blocks(text: &str) -> String {
    let text = text.trim();
    let Some(inner) = text.strip_prefix("```").and_then(|t| t.strip_suffix("```")) else {
        return text.to_string();
    };
    inner.strip_prefix("json").unwrap_or(inner).trim().to_string()
}
