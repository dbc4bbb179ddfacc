// OpenAI-compatible transcription endpoint (`/audio/transcriptions`)

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TranscriptionConfig;
use crate::error::{Result, SubversesError};
use crate::openai::ApiClient;
use crate::subtitle::Cue;
use super::{TranscriptionService, common::{AbstractTranscriptionSegment, TranscriptionMapper, TranscriptionRequest}};

/// `verbose_json` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIVerboseOutput {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<OpenAIWhisperSegment>,
    pub language: Option<String>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIWhisperSegment {
    pub id: Option<u64>,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub avg_logprob: Option<f64>,
    pub no_speech_prob: Option<f64>,
}

/// Mapper for OpenAI Whisper format to abstract format
pub struct OpenAIWhisperMapper;

impl TranscriptionMapper<OpenAIVerboseOutput> for OpenAIWhisperMapper {
    fn to_abstract_segments(output: OpenAIVerboseOutput) -> Result<Vec<AbstractTranscriptionSegment>> {
        if output.segments.is_empty() && !output.text.trim().is_empty() {
            // Some compatible servers omit segments; keep the text as one cue
            let duration = output.duration.ok_or_else(|| {
                SubversesError::FatalRemote(
                    "transcription response has text but neither segments nor duration".to_string(),
                )
            })?;
            return Ok(vec![AbstractTranscriptionSegment {
                start_time: 0.0,
                end_time: duration,
                text: output.text.trim().to_string(),
            }]);
        }

        Ok(output
            .segments
            .into_iter()
            .map(|seg| AbstractTranscriptionSegment {
                start_time: seg.start,
                end_time: seg.end,
                text: seg.text.trim().to_string(),
            })
            .collect())
    }
}

pub struct OpenAITranscriber {
    api: ApiClient,
}

impl OpenAITranscriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let api = ApiClient::new(
            &config.base_url,
            config.api_key.clone(),
            config.organization.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self { api })
    }

    fn build_form(request: &TranscriptionRequest) -> Result<Form> {
        let file = Part::bytes(request.audio_wav.clone())
            .file_name(request.file_name.clone())
            .mime_str("audio/wav")?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", request.model.clone())
            .text("response_format", "verbose_json");

        if let Some(prompt) = &request.prompt {
            form = form.text("prompt", prompt.clone());
        }
        if let Some(language) = &request.language {
            form = form.text("language", language.clone());
        }

        Ok(form)
    }
}

#[async_trait]
impl TranscriptionService for OpenAITranscriber {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Vec<Cue>> {
        info!(
            "Transcribing segment {} ({} bytes) with {}",
            request.segment_index,
            request.audio_wav.len(),
            request.model
        );

        let form = Self::build_form(request)?;
        let response = self
            .api
            .send(self.api.post("audio/transcriptions").multipart(form), "Transcription")
            .await?;

        let body = response
            .text()
            .await
            .map_err(|e| SubversesError::TransientRemote(format!("Failed to read transcription response: {}", e)))?;
        debug!("Raw transcription response: {}", body);

        let output: OpenAIVerboseOutput = serde_json::from_str(&body)
            .map_err(|e| SubversesError::FatalRemote(format!("Failed to parse transcription response: {}", e)))?;

        OpenAIWhisperMapper::to_cues(output)
    }
}
