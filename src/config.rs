use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, SubversesError};
use crate::language;

/// OpenAI upload limit is 25 MB; keep a margin for multipart overhead
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 24 * 1024 * 1024 + 512 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub segmentation: SegmentationConfig,
    pub transcription: TranscriptionConfig,
    pub translation: TranslationConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding working directories and output subtitles
    pub data_dir: PathBuf,
    /// Source language, ISO 639-1 code
    pub translate_from: String,
    /// Target language, full English name (e.g. "Polish")
    pub translate_to: String,
    /// Fail instead of transcribing when no manual transcript exists
    pub dont_transcribe_audio: bool,
    /// Ignore manual transcripts and always transcribe the audio
    pub force_transcription_from_audio: bool,
    /// Lowest segment index that may be (re)transcribed
    pub start_transcription_segment: usize,
    /// Reuse fragments, checkpoints and outputs already on disk
    pub skip_existing: bool,
    /// Write the source-language transcript instead of translating it
    pub skip_translation: bool,
    /// Mux video, audio and subtitles once the subtitle file exists
    pub render: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Minimum silence length (seconds) that qualifies as a cut
    pub min_silence_len_sec: f64,
    /// Amplitude at or below which audio counts as silence (dBFS)
    pub silence_threshold: f64,
    /// Upper bound for the encoded WAV size of one segment
    pub max_segment_bytes: u64,
    /// More segments than this is treated as a detection failure
    pub max_segments: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub organization: Option<String>,
    /// Transcription model, e.g. "whisper-1"
    pub model: String,
    /// Vocabulary hint passed with every segment
    pub prompt: Option<String>,
    /// Extra attempts after the first failure
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub organization: Option<String>,
    /// Chat model used for translation
    pub model: String,
    /// Style/context instructions sent with every chunk
    pub additional_prompt: Option<String>,
    pub temperature: f32,
    /// Upper bound on the characters of cue text in one chunk
    pub max_chunk_chars: usize,
    /// Upper bound on the number of cues in one chunk
    pub max_chunk_cues: usize,
    /// Extra attempts for transient remote errors
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    /// Wrap translated lines at this column, 0 disables wrapping
    pub line_width: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            translate_from: "en".to_string(),
            translate_to: "Polish".to_string(),
            dont_transcribe_audio: true,
            force_transcription_from_audio: false,
            start_transcription_segment: 0,
            skip_existing: true,
            skip_translation: false,
            render: false,
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_silence_len_sec: 2.0,
            silence_threshold: -40.0,
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            max_segments: 1000,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            organization: None,
            model: "whisper-1".to_string(),
            prompt: None,
            max_retries: 2,
            retry_delay_ms: 2_000,
            timeout_secs: 600,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            organization: None,
            model: "gpt-4o-mini".to_string(),
            additional_prompt: None,
            temperature: 0.0,
            max_chunk_chars: 2_000,
            max_chunk_cues: 8,
            max_retries: 2,
            retry_delay_ms: 2_000,
            timeout_secs: 300,
            line_width: 60,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SubversesError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| SubversesError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SubversesError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SubversesError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject settings that would only fail after expensive work has started
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segmentation;
        if !(-60.0..=-5.0).contains(&seg.silence_threshold) {
            return Err(SubversesError::Config(format!(
                "silence_threshold must be between -60 and -5 dB, got {}",
                seg.silence_threshold
            )));
        }
        if seg.min_silence_len_sec <= 0.0 || !seg.min_silence_len_sec.is_finite() {
            return Err(SubversesError::Config(format!(
                "min_silence_len_sec must be positive, got {}",
                seg.min_silence_len_sec
            )));
        }
        if seg.max_segments == 0 {
            return Err(SubversesError::Config("max_segments must be at least 1".to_string()));
        }

        if !language::is_known_code(&self.pipeline.translate_from) {
            return Err(SubversesError::Config(format!(
                "Invalid language code '{}'; use a two letter ISO 639-1 code",
                self.pipeline.translate_from
            )));
        }
        if self.pipeline.translate_to.trim().is_empty() {
            return Err(SubversesError::Config("translate_to must not be empty".to_string()));
        }

        let tr = &self.translation;
        if tr.max_chunk_chars == 0 || tr.max_chunk_cues == 0 {
            return Err(SubversesError::Config(
                "translation chunk limits must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the run may fall back to transcribing audio
    pub fn transcription_allowed(&self) -> bool {
        self.pipeline.force_transcription_from_audio || !self.pipeline.dont_transcribe_audio
    }
}
