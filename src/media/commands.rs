use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SubversesError};

/// Sample rate of decoded audio; speech models resample to this anyway
pub const DECODE_SAMPLE_RATE: u32 = 16_000;

/// One ffmpeg invocation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    pub fn subtitle_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:s").arg(codec)
    }

    pub fn map_input(self, input_index: usize) -> Self {
        self.arg("-map").arg(input_index.to_string())
    }

    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Run to completion; a non-zero exit is an error carrying ffmpeg's stderr
    pub async fn execute(&self) -> Result<()> {
        debug!("Executing media command: {} {:?}", self.binary_path, self.args);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| SubversesError::Media(format!("Failed to execute {}: {}", self.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SubversesError::Media(format!(
                "{} failed: {}",
                self.description,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Builds the ffmpeg commands the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Any audio or video input to 16 kHz mono 16-bit PCM WAV
    pub fn decode_audio<P: AsRef<Path>>(&self, input_path: P, wav_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio decoding")
            .input(input_path)
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_sample_rate(DECODE_SAMPLE_RATE)
            .audio_channels(1)
            .overwrite()
            .output(wav_path)
    }

    /// Mux video, audio and subtitles as a soft subtitle track without re-encoding
    pub fn render<P: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: P,
        subtitle_path: P,
        output_path: P,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Video rendering")
            .input(video_path)
            .input(audio_path)
            .input(subtitle_path)
            .video_codec("copy")
            .audio_codec("copy")
            .subtitle_codec("mov_text")
            .map_input(0)
            .map_input(1)
            .map_input(2)
            .overwrite()
            .output(output_path)
    }

    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}
