use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser)]
#[command(author, version, about = "Translated subtitles for YouTube videos", long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Produce a (translated) subtitle file for one video
    Process(ProcessArgs),

    /// Show the per-segment transcription state of a video
    Status {
        /// YouTube URL or video id
        youtube_url: String,

        /// Directory holding working directories and outputs
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ProcessArgs {
    /// YouTube URL or video id
    pub youtube_url: String,

    /// Downloaded audio track (WAV is read directly, other formats go through ffmpeg)
    #[arg(long)]
    pub audio: Option<PathBuf>,

    /// Existing transcript of the video in SRT format
    #[arg(long)]
    pub manual_transcript: Option<PathBuf>,

    /// Downloaded video, needed for --render
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// Source language (ISO 639-1 code)
    #[arg(long)]
    pub translate_from: Option<String>,

    /// Target language name, e.g. "Polish"
    #[arg(long)]
    pub translate_to: Option<String>,

    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub whisper_model: Option<String>,

    /// Vocabulary hint for transcription
    #[arg(long)]
    pub whisper_prompt: Option<String>,

    #[arg(long)]
    pub gpt_model: Option<String>,

    /// Extra instructions sent with every translation chunk
    #[arg(long)]
    pub translate_additional_prompt: Option<String>,

    /// Lowest segment index that may be transcribed again
    #[arg(long)]
    pub start_transcription_segment: Option<usize>,

    /// Transcribe the audio even when a manual transcript exists
    #[arg(long)]
    pub force_transcription_from_audio: bool,

    /// Transcribe the audio when no manual transcript exists
    #[arg(long)]
    pub allow_transcription: bool,

    /// Redo work whose results already exist on disk
    #[arg(long)]
    pub no_skip_existing: bool,

    #[arg(long)]
    pub min_silence_len_sec: Option<f64>,

    /// Silence threshold in dBFS (-60..-5)
    #[arg(long, allow_hyphen_values = true)]
    pub silence_threshold: Option<f64>,

    /// Write the source-language transcript without translating
    #[arg(long)]
    pub no_translate: bool,

    /// Mux video, audio and subtitles into one file
    #[arg(long)]
    pub render: bool,
}

impl ProcessArgs {
    /// Apply command line overrides on top of file/default configuration
    pub fn apply(&self, config: &mut Config) {
        let pipeline = &mut config.pipeline;
        if let Some(from) = &self.translate_from {
            pipeline.translate_from = from.trim().to_lowercase();
        }
        if let Some(to) = &self.translate_to {
            pipeline.translate_to = to.trim().to_string();
        }
        if let Some(dir) = &self.data_dir {
            pipeline.data_dir = dir.clone();
        }
        if let Some(start) = self.start_transcription_segment {
            pipeline.start_transcription_segment = start;
        }
        if self.force_transcription_from_audio {
            pipeline.force_transcription_from_audio = true;
        }
        if self.allow_transcription {
            pipeline.dont_transcribe_audio = false;
        }
        if self.no_skip_existing {
            pipeline.skip_existing = false;
        }
        if self.no_translate {
            pipeline.skip_translation = true;
        }
        if self.render {
            pipeline.render = true;
        }

        if let Some(len) = self.min_silence_len_sec {
            config.segmentation.min_silence_len_sec = len;
        }
        if let Some(threshold) = self.silence_threshold {
            config.segmentation.silence_threshold = threshold;
        }

        if let Some(model) = &self.whisper_model {
            config.transcription.model = model.clone();
        }
        if let Some(prompt) = &self.whisper_prompt {
            config.transcription.prompt = Some(prompt.clone());
        }
        if let Some(model) = &self.gpt_model {
            config.translation.model = model.clone();
        }
        if let Some(prompt) = &self.translate_additional_prompt {
            config.translation.additional_prompt = Some(prompt.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(argv: &[&str]) -> ProcessArgs {
        let args = Args::try_parse_from(argv).unwrap();
        match args.command {
            Commands::Process(process) => process,
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let process = process(&[
            "subverses",
            "process",
            "https://youtu.be/dQw4w9WgXcQ",
            "--audio",
            "a.m4a",
            "--translate-to",
            "German",
            "--silence-threshold",
            "-35",
            "--start-transcription-segment",
            "4",
            "--allow-transcription",
            "--no-skip-existing",
        ]);

        let mut config = Config::default();
        process.apply(&mut config);

        assert_eq!(config.pipeline.translate_to, "German");
        assert_eq!(config.pipeline.start_transcription_segment, 4);
        assert_eq!(config.segmentation.silence_threshold, -35.0);
        assert!(!config.pipeline.dont_transcribe_audio);
        assert!(!config.pipeline.skip_existing);
        assert_eq!(config.pipeline.translate_from, "en");
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let process = process(&["subverses", "process", "dQw4w9WgXcQ"]);
        let mut config = Config::default();
        config.translation.model = "from-file".to_string();
        process.apply(&mut config);

        assert_eq!(config.translation.model, "from-file");
        assert!(config.pipeline.dont_transcribe_audio);
        assert!(config.pipeline.skip_existing);
    }

    #[test]
    fn test_status_accepts_global_flags() {
        let args = Args::try_parse_from(["subverses", "status", "dQw4w9WgXcQ", "-v"]).unwrap();
        assert!(args.verbose);
        assert!(matches!(args.command, Commands::Status { .. }));
    }
}
