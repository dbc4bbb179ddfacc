use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use crate::config::MediaConfig;
use crate::error::Result;
use super::{MediaCommandBuilder, MediaProcessorTrait};

/// ffmpeg-backed media processor
pub struct MediaProcessorImpl {
    command_builder: MediaCommandBuilder,
}

impl MediaProcessorImpl {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            command_builder: MediaCommandBuilder::new(&config.binary_path),
        }
    }
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    async fn decode_audio(&self, input_path: &Path, wav_path: &Path) -> Result<()> {
        info!("Decoding audio {} -> {}", input_path.display(), wav_path.display());
        self.command_builder.decode_audio(input_path, wav_path).execute().await?;
        info!("Audio decoding completed");
        Ok(())
    }

    async fn render(
        &self,
        video_path: &Path,
        audio_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
    ) -> Result<()> {
        info!(
            "Rendering {} with subtitles {} -> {}",
            video_path.display(),
            subtitle_path.display(),
            output_path.display()
        );
        self.command_builder
            .render(video_path, audio_path, subtitle_path, output_path)
            .execute()
            .await?;
        info!("Rendering completed");
        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        self.command_builder.version_check().execute().await
    }
}
