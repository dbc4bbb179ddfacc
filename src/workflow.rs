use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::assemble::assemble_from_store;
use crate::config::Config;
use crate::error::{Result, SubversesError};
use crate::media::{MediaProcessorFactory, MediaProcessorTrait};
use crate::segment::{AudioTrack, SilenceSegmenter};
use crate::source::{SourceMaterial, SourceProvider, VideoIdentity};
use crate::store::{SegmentState, SegmentStore, TranslationCheckpoint};
use crate::subtitle::{Transcript, write_srt};
use crate::transcribe::{TranscriptionDriver, TranscriptionService, openai::OpenAITranscriber};
use crate::translate::{TranslationDriver, TranslationService, openai::OpenAITranslator};

const DECODED_AUDIO_FILE: &str = "audio.16k.wav";
const RENDERED_VIDEO_FILE: &str = "rendered.mp4";

/// Where the source-language transcript came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptOrigin {
    Manual,
    Audio { segments: usize },
    /// The output already existed and nothing was produced
    ExistingOutput,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub origin: TranscriptOrigin,
    pub cue_count: usize,
    pub rendered_path: Option<PathBuf>,
}

pub struct Workflow {
    config: Config,
    transcriber: Box<dyn TranscriptionService>,
    translator: Box<dyn TranslationService>,
    media: Box<dyn MediaProcessorTrait>,
}

impl Workflow {
    /// Pipeline backed by the OpenAI-compatible services and ffmpeg
    pub fn new(config: Config) -> Result<Self> {
        let transcriber = Box::new(OpenAITranscriber::new(&config.transcription)?);
        let translator = Box::new(OpenAITranslator::new(&config.translation)?);
        let media = MediaProcessorFactory::create_processor(&config.media);
        Ok(Self::with_services(config, transcriber, translator, media))
    }

    pub fn with_services(
        config: Config,
        transcriber: Box<dyn TranscriptionService>,
        translator: Box<dyn TranslationService>,
        media: Box<dyn MediaProcessorTrait>,
    ) -> Self {
        Self {
            config,
            transcriber,
            translator,
            media,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Language of the output file: the target, or the source when translation is skipped
    pub fn output_language(&self) -> &str {
        let pipeline = &self.config.pipeline;
        if pipeline.skip_translation {
            &pipeline.translate_from
        } else {
            &pipeline.translate_to
        }
    }

    pub fn output_path(&self, identity: &VideoIdentity) -> PathBuf {
        identity.output_path(&self.config.pipeline.data_dir, self.output_language())
    }

    /// Produce the subtitle file for one video
    pub async fn run(&self, source: &dyn SourceProvider, identity: &VideoIdentity) -> Result<RunReport> {
        self.config.validate()?;
        let pipeline = &self.config.pipeline;

        let work_dir = identity.work_dir(&pipeline.data_dir);
        let output_path = self.output_path(identity);
        fs::create_dir_all(&work_dir).await?;
        info!("Processing {} in {}", identity.url, work_dir.display());

        let material = source.acquire(identity).await?;

        if pipeline.skip_existing && output_path.exists() {
            info!("Subtitle file already exists: {}", output_path.display());
            let rendered_path = self.render(&material, &output_path, &work_dir).await?;
            return Ok(RunReport {
                output_path,
                origin: TranscriptOrigin::ExistingOutput,
                cue_count: 0,
                rendered_path,
            });
        }

        let use_manual = material.manual_transcript.is_some() && !pipeline.force_transcription_from_audio;
        if !use_manual && !self.config.transcription_allowed() {
            return Err(SubversesError::Config(format!(
                "No manual transcript for {} and transcription from audio is disabled; \
                 pass --allow-transcription to transcribe the audio",
                identity.video_id
            )));
        }

        let (transcript, origin) = match &material.manual_transcript {
            Some(cues) if use_manual => {
                info!("Using manual transcript ({} cues); skipping transcription", cues.len());
                let transcript = Transcript::new(cues.clone(), pipeline.translate_from.clone());
                check_cue_timing(&transcript)?;
                (transcript, TranscriptOrigin::Manual)
            }
            _ => {
                if material.manual_transcript.is_some() {
                    info!("Ignoring manual transcript, transcription from audio is forced");
                }
                let (transcript, segments) = self.transcribe_audio(&material, &work_dir).await?;
                (transcript, TranscriptOrigin::Audio { segments })
            }
        };

        let transcript_path = work_dir.join(format!("transcript.{}.srt", pipeline.translate_from));
        write_srt(&transcript.cues, &transcript_path).await?;
        if transcript.is_empty() {
            warn!("Transcript has no cues; the subtitle file will be empty");
        }

        let final_transcript = if pipeline.skip_translation {
            info!("Translation skipped; writing the {} transcript", pipeline.translate_from);
            transcript
        } else {
            let checkpoint = TranslationCheckpoint::new(&work_dir, &pipeline.translate_to);
            TranslationDriver::new(self.translator.as_ref(), &self.config.translation)
                .with_checkpoint(checkpoint)
                .run(&transcript, &pipeline.translate_to)
                .await?
        };

        write_srt(&final_transcript.cues, &output_path).await?;
        info!("Subtitles written to {}", output_path.display());

        let rendered_path = self.render(&material, &output_path, &work_dir).await?;

        Ok(RunReport {
            output_path,
            origin,
            cue_count: final_transcript.len(),
            rendered_path,
        })
    }

    /// Segment the audio and bring every segment's transcript into the store
    async fn transcribe_audio(&self, material: &SourceMaterial, work_dir: &Path) -> Result<(Transcript, usize)> {
        let pipeline = &self.config.pipeline;
        let audio_path = material.audio.as_deref().ok_or_else(|| {
            SubversesError::Config("Transcription needs an audio file; pass --audio".to_string())
        })?;

        let track = self.load_audio(audio_path, work_dir).await?;
        let segments = SilenceSegmenter::new(self.config.segmentation.clone()).segment(&track)?;

        let mut store = SegmentStore::open(work_dir, pipeline.skip_existing)?;
        TranscriptionDriver::new(
            self.transcriber.as_ref(),
            &self.config.transcription,
            Some(pipeline.translate_from.clone()),
        )
        .run(&mut store, &track, &segments, pipeline.start_transcription_segment)
        .await?;

        let transcript = assemble_from_store(&store, &segments, &pipeline.translate_from)?;
        Ok((transcript, segments.len()))
    }

    /// WAV is read directly; anything else is decoded to WAV in the working directory first
    async fn load_audio(&self, audio_path: &Path, work_dir: &Path) -> Result<AudioTrack> {
        let is_wav = audio_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if is_wav {
            return AudioTrack::from_wav(audio_path);
        }

        let decoded = work_dir.join(DECODED_AUDIO_FILE);
        if self.config.pipeline.skip_existing && decoded.exists() {
            info!("Using decoded audio {}", decoded.display());
        } else {
            self.media.check_availability().await?;
            self.media.decode_audio(audio_path, &decoded).await?;
        }
        AudioTrack::from_wav(&decoded)
    }

    async fn render(&self, material: &SourceMaterial, subtitle_path: &Path, work_dir: &Path) -> Result<Option<PathBuf>> {
        if !self.config.pipeline.render {
            return Ok(None);
        }
        let (Some(video), Some(audio)) = (&material.video, &material.audio) else {
            warn!("Rendering needs both --video and --audio; skipping");
            return Ok(None);
        };

        let rendered = work_dir.join(RENDERED_VIDEO_FILE);
        if rendered.exists() {
            info!("Skipping rendering, file already exists: {}", rendered.display());
            return Ok(Some(rendered));
        }

        self.media.check_availability().await?;
        self.media.render(video, audio, subtitle_path, &rendered).await?;
        Ok(Some(rendered))
    }

    /// Per-segment state of a video's working directory
    pub fn status(&self, identity: &VideoIdentity) -> Result<Vec<SegmentState>> {
        SegmentStore::read_states(identity.work_dir(&self.config.pipeline.data_dir))
    }
}

fn check_cue_timing(transcript: &Transcript) -> Result<()> {
    match transcript.cues.iter().position(|cue| cue.end_ms <= cue.start_ms) {
        Some(position) => Err(SubversesError::Invariant(format!(
            "manual transcript cue {} ends at {} ms but starts at {} ms",
            position + 1,
            transcript.cues[position].end_ms,
            transcript.cues[position].start_ms
        ))),
        None => Ok(()),
    }
}
