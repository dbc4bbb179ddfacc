use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubversesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Timeout, rate limit or 5xx-class error; worth another attempt
    #[error("Transient remote error: {0}")]
    TransientRemote(String),

    /// Auth failure or malformed request; retrying cannot help
    #[error("Fatal remote error: {0}")]
    FatalRemote(String),

    #[error(
        "Transcription of segment {index} failed after {attempts} attempt(s): {reason}. \
         Resume with --start-transcription-segment {index}"
    )]
    SegmentFailed {
        index: usize,
        attempts: u32,
        reason: String,
    },

    #[error("Translation chunk {chunk} returned {actual} line(s), expected {expected}")]
    ChunkMismatch {
        chunk: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Data invariant violated: {0}")]
    Invariant(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Subtitle error: {0}")]
    Subtitle(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl SubversesError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientRemote(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SubversesError>;
