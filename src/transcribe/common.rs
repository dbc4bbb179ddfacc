use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::subtitle::Cue;

/// What is sent to a transcription service for one segment
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub segment_index: usize,
    /// 16-bit mono WAV bytes of the segment
    pub audio_wav: Vec<u8>,
    pub file_name: String,
    pub model: String,
    /// Vocabulary hint for the recognizer
    pub prompt: Option<String>,
    /// ISO 639-1 code of the spoken language
    pub language: Option<String>,
}

/// Service-agnostic timed text, in seconds relative to the submitted audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbstractTranscriptionSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

/// Trait for converting service-specific transcription formats to cues
pub trait TranscriptionMapper<T> {
    fn to_abstract_segments(service_result: T) -> Result<Vec<AbstractTranscriptionSegment>>;

    /// Cues in milliseconds; segments with no text are dropped
    fn to_cues(service_result: T) -> Result<Vec<Cue>> {
        Ok(Self::to_abstract_segments(service_result)?
            .into_iter()
            .filter(|seg| !seg.text.trim().is_empty())
            .map(|seg| Cue {
                start_ms: seconds_to_ms(seg.start_time),
                end_ms: seconds_to_ms(seg.end_time),
                text: seg.text.trim().to_string(),
            })
            .collect())
    }
}

/// Round to the nearest millisecond; negative times clamp to zero
pub fn seconds_to_ms(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_to_ms_rounds() {
        assert_eq!(seconds_to_ms(65.123), 65_123);
        assert_eq!(seconds_to_ms(0.0004), 0);
        assert_eq!(seconds_to_ms(-1.0), 0);
        assert_eq!(seconds_to_ms(f64::NAN), 0);
    }
}
