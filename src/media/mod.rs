// Media processing through an external ffmpeg binary
//
// - commands: argument building and process execution
// - processor: MediaProcessorTrait implementation used by the pipeline

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Decode any audio/video input to 16 kHz mono PCM WAV
    async fn decode_audio(&self, input_path: &Path, wav_path: &Path) -> Result<()>;

    /// Mux video, audio and a subtitle track into `output_path`
    async fn render(
        &self,
        video_path: &Path,
        audio_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
    ) -> Result<()>;

    async fn check_availability(&self) -> Result<()>;
}

pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    pub fn create_processor(config: &MediaConfig) -> Box<dyn MediaProcessorTrait> {
        Box::new(MediaProcessorImpl::new(config))
    }
}
