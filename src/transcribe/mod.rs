// Per-segment transcription
//
// The driver walks the segments in index order, one remote call at a time:
// - segments below the start offset must already be transcribed
// - done segments are skipped when skip_existing is on
// - transient remote errors are retried up to `max_retries` extra attempts
// - anything else, or exhausted retries, marks the segment failed and halts
// - a response with a cue that does not end after it starts is never stored;
//   the segment is marked failed so a resume at that index transcribes it again
//
// To add a new transcription service, implement TranscriptionService and map
// the service's response with a TranscriptionMapper.

pub mod common;
pub mod openai;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{info, warn};

pub use common::*;
use crate::config::TranscriptionConfig;
use crate::error::{Result, SubversesError};
use crate::segment::{AudioTrack, Segment};
use crate::store::{SegmentStore, TranscriptFragment};
use crate::subtitle::Cue;

/// Remote speech-to-text service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Timed cues for the submitted audio, times relative to its start
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Vec<Cue>>;
}

pub struct TranscriptionDriver<'a> {
    service: &'a dyn TranscriptionService,
    config: &'a TranscriptionConfig,
    language: Option<String>,
}

impl<'a> TranscriptionDriver<'a> {
    pub fn new(
        service: &'a dyn TranscriptionService,
        config: &'a TranscriptionConfig,
        language: Option<String>,
    ) -> Self {
        Self {
            service,
            config,
            language,
        }
    }

    /// Bring every segment to done, or stop at the first segment that cannot be transcribed
    pub async fn run(
        &self,
        store: &mut SegmentStore,
        track: &AudioTrack,
        segments: &[Segment],
        start_segment: usize,
    ) -> Result<()> {
        store.truncate(segments.len())?;
        for segment in segments {
            store.record_pending(segment)?;
        }

        if start_segment > segments.len() {
            return Err(SubversesError::Config(format!(
                "start segment {} is beyond the {} detected segment(s)",
                start_segment,
                segments.len()
            )));
        }
        if let Some(missing) = (0..start_segment).find(|i| !store.is_done(*i)) {
            return Err(SubversesError::Invariant(format!(
                "segment {} is before the start segment {} but has no transcript; \
                 resume from segment {} instead",
                missing, start_segment, missing
            )));
        }

        match store.next_resume_index(start_segment) {
            Some(index) => info!("Resuming transcription at segment {} of {}", index, segments.len()),
            None => {
                info!("All {} segment(s) already transcribed", segments.len());
                return Ok(());
            }
        }

        let progress = ProgressBar::new(segments.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        progress.set_message("Transcribing");
        progress.set_position(start_segment as u64);

        for segment in &segments[start_segment..] {
            if store.can_skip(segment.index) {
                info!("Skipping segment {}: transcript already exists", segment.index);
                progress.inc(1);
                continue;
            }
            if store.is_done(segment.index) {
                store.reset(segment.index)?;
            }

            let result = self.transcribe_segment(store, track, segment).await;
            if result.is_err() {
                progress.abandon();
            }
            result?;
            progress.inc(1);
        }

        progress.finish_with_message("Transcribed");
        Ok(())
    }

    /// Transcribe one segment with retries and persist its fragment
    pub async fn transcribe_segment(
        &self,
        store: &mut SegmentStore,
        track: &AudioTrack,
        segment: &Segment,
    ) -> Result<TranscriptFragment> {
        let index = segment.index;
        let audio_wav = segment.to_wav_bytes(track)?;
        store.write_segment_audio(index, &audio_wav)?;

        let request = TranscriptionRequest {
            segment_index: index,
            audio_wav,
            file_name: format!("segment_{:03}.wav", index),
            model: self.config.model.clone(),
            prompt: self.config.prompt.clone(),
            language: self.language.clone(),
        };

        store.mark_in_progress(index)?;
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.service.transcribe(&request).await {
                Ok(cues) => {
                    let fragment = TranscriptFragment::new(segment, cues);
                    if let Some((position, cue)) = fragment.first_invalid_cue() {
                        let reason = format!(
                            "cue {} ends at {} ms but starts at {} ms",
                            position, cue.end_ms, cue.start_ms
                        );
                        warn!("Segment {} returned an unusable transcript: {}", index, reason);
                        store.record_retry(index, &reason)?;
                        store.mark_failed(index, &reason)?;
                        return Err(SubversesError::SegmentFailed {
                            index,
                            attempts: attempt,
                            reason,
                        });
                    }

                    store.mark_done(index, &fragment)?;
                    info!(
                        "Segment {} transcribed: {} cue(s) ({}-{} ms)",
                        index,
                        fragment.cues.len(),
                        segment.start_ms(),
                        segment.end_ms()
                    );
                    return Ok(fragment);
                }
                Err(e) => {
                    let reason = e.to_string();
                    store.record_retry(index, &reason)?;

                    if e.is_transient() && attempt < max_attempts {
                        warn!(
                            "Segment {} attempt {}/{} failed: {}; retrying",
                            index, attempt, max_attempts, reason
                        );
                        if self.config.retry_delay_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(
                                self.config.retry_delay_ms * attempt as u64,
                            ))
                            .await;
                        }
                        continue;
                    }

                    store.mark_failed(index, &reason)?;
                    return Err(SubversesError::SegmentFailed {
                        index,
                        attempts: attempt,
                        reason,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::tests::{config, silence, tone, track};
    use crate::segment::SilenceSegmenter;
    use crate::store::SegmentStatus;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fails the listed segments a number of times before answering
    struct ScriptedService {
        failures: Mutex<HashMap<usize, u32>>,
        calls: Mutex<Vec<usize>>,
    }

    impl ScriptedService {
        fn new(failures: &[(usize, u32)]) -> Self {
            Self {
                failures: Mutex::new(failures.iter().copied().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranscriptionService for ScriptedService {
        async fn transcribe(&self, request: &TranscriptionRequest) -> Result<Vec<Cue>> {
            self.calls.lock().unwrap().push(request.segment_index);
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&request.segment_index) {
                if *left > 0 {
                    *left -= 1;
                    return Err(SubversesError::TransientRemote("503".to_string()));
                }
            }
            Ok(vec![Cue::new(0, 500, format!("segment {}", request.segment_index))])
        }
    }

    fn transcription_config(max_retries: u32) -> TranscriptionConfig {
        TranscriptionConfig {
            max_retries,
            retry_delay_ms: 0,
            ..TranscriptionConfig::default()
        }
    }

    fn three_segments() -> (AudioTrack, Vec<Segment>) {
        let track = track(&[tone(1.0), silence(1.0), tone(1.0), silence(1.0), tone(1.0)]);
        let segments = SilenceSegmenter::new(config(0.5, 20_000)).segment(&track).unwrap();
        assert_eq!(segments.len(), 3);
        (track, segments)
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (track, segments) = three_segments();
        let service = ScriptedService::new(&[(1, 2)]);
        let cfg = transcription_config(2);
        let mut store = SegmentStore::open(dir.path(), true).unwrap();

        TranscriptionDriver::new(&service, &cfg, None)
            .run(&mut store, &track, &segments, 0)
            .await
            .unwrap();

        assert_eq!(service.calls(), vec![0, 1, 1, 1, 2]);
        assert_eq!(store.state(1).unwrap().retry_count, 2);
        assert!((0..3).all(|i| store.is_done(i)));
    }

    #[tokio::test]
    async fn test_exhausted_retries_halt_at_segment() {
        let dir = tempfile::tempdir().unwrap();
        let (track, segments) = three_segments();
        let service = ScriptedService::new(&[(1, 3)]);
        let cfg = transcription_config(2);
        let mut store = SegmentStore::open(dir.path(), true).unwrap();

        let err = TranscriptionDriver::new(&service, &cfg, None)
            .run(&mut store, &track, &segments, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, SubversesError::SegmentFailed { index: 1, attempts: 3, .. }));
        assert_eq!(service.calls(), vec![0, 1, 1, 1]);
        assert!(store.is_done(0));
        assert_eq!(store.state(1).unwrap().status, SegmentStatus::Failed);
        assert_eq!(store.state(2).unwrap().status, SegmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (track, segments) = three_segments();
        let cfg = transcription_config(5);
        let mut store = SegmentStore::open(dir.path(), true).unwrap();

        let mut service = MockTranscriptionService::new();
        service
            .expect_transcribe()
            .times(1)
            .returning(|_| Err(SubversesError::FatalRemote("401 Unauthorized".to_string())));

        let err = TranscriptionDriver::new(&service, &cfg, None)
            .run(&mut store, &track, &segments, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, SubversesError::SegmentFailed { index: 0, attempts: 1, .. }));
        assert!(!store.is_done(0));
    }

    #[tokio::test]
    async fn test_zero_length_cue_fails_segment_and_allows_resume() {
        let dir = tempfile::tempdir().unwrap();
        let (track, segments) = three_segments();
        let cfg = transcription_config(2);
        {
            let mut service = MockTranscriptionService::new();
            service.expect_transcribe().times(2).returning(|req| {
                if req.segment_index == 1 {
                    Ok(vec![Cue::new(900, 900, "glitch")])
                } else {
                    Ok(vec![Cue::new(0, 500, "fine")])
                }
            });
            let mut store = SegmentStore::open(dir.path(), true).unwrap();

            let err = TranscriptionDriver::new(&service, &cfg, None)
                .run(&mut store, &track, &segments, 0)
                .await
                .unwrap_err();

            assert!(matches!(err, SubversesError::SegmentFailed { index: 1, attempts: 1, .. }));
            assert!(err.to_string().contains("--start-transcription-segment 1"));
            let state = store.state(1).unwrap();
            assert_eq!(state.status, SegmentStatus::Failed);
            assert!(state.last_error.as_deref().unwrap().contains("cue 0"));
            assert!(!store.is_done(1));
            assert!(!dir.path().join("fragments/segment_001.json").exists());
        }

        let service = ScriptedService::new(&[]);
        let mut store = SegmentStore::open(dir.path(), true).unwrap();
        TranscriptionDriver::new(&service, &cfg, None)
            .run(&mut store, &track, &segments, 1)
            .await
            .unwrap();

        assert_eq!(service.calls(), vec![1, 2]);
        assert!((0..3).all(|i| store.is_done(i)));
    }

    #[tokio::test]
    async fn test_request_carries_model_prompt_and_language() {
        let dir = tempfile::tempdir().unwrap();
        let (track, segments) = three_segments();
        let cfg = TranscriptionConfig {
            prompt: Some("Kubernetes, etcd".to_string()),
            ..transcription_config(0)
        };
        let mut store = SegmentStore::open(dir.path(), true).unwrap();

        let mut service = MockTranscriptionService::new();
        service
            .expect_transcribe()
            .withf(|req| {
                req.model == "whisper-1"
                    && req.prompt.as_deref() == Some("Kubernetes, etcd")
                    && req.language.as_deref() == Some("en")
                    && req.audio_wav.starts_with(b"RIFF")
            })
            .times(3)
            .returning(|_| Ok(vec![Cue::new(0, 100, "x")]));

        TranscriptionDriver::new(&service, &cfg, Some("en".to_string()))
            .run(&mut store, &track, &segments, 0)
            .await
            .unwrap();
        assert!(dir.path().join("segments/segment_002.wav").exists());
    }

    #[tokio::test]
    async fn test_start_offset_skips_earlier_done_segments() {
        let dir = tempfile::tempdir().unwrap();
        let (track, segments) = three_segments();
        let cfg = transcription_config(2);
        {
            let failing = ScriptedService::new(&[(1, 3)]);
            let mut store = SegmentStore::open(dir.path(), true).unwrap();
            let _ = TranscriptionDriver::new(&failing, &cfg, None)
                .run(&mut store, &track, &segments, 0)
                .await;
        }

        let service = ScriptedService::new(&[]);
        let mut store = SegmentStore::open(dir.path(), true).unwrap();
        TranscriptionDriver::new(&service, &cfg, None)
            .run(&mut store, &track, &segments, 1)
            .await
            .unwrap();

        assert_eq!(service.calls(), vec![1, 2]);
        assert!((0..3).all(|i| store.is_done(i)));
    }

    #[tokio::test]
    async fn test_start_offset_past_missing_segment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (track, segments) = three_segments();
        let cfg = transcription_config(0);
        let service = ScriptedService::new(&[]);
        let mut store = SegmentStore::open(dir.path(), true).unwrap();

        let err = TranscriptionDriver::new(&service, &cfg, None)
            .run(&mut store, &track, &segments, 2)
            .await
            .unwrap_err();

        assert!(matches!(err, SubversesError::Invariant(ref m) if m.contains("segment 0")));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_without_skip_existing_segments_are_retranscribed() {
        let dir = tempfile::tempdir().unwrap();
        let (track, segments) = three_segments();
        let cfg = transcription_config(0);
        {
            let service = ScriptedService::new(&[]);
            let mut store = SegmentStore::open(dir.path(), true).unwrap();
            TranscriptionDriver::new(&service, &cfg, None)
                .run(&mut store, &track, &segments, 0)
                .await
                .unwrap();
        }

        let service = ScriptedService::new(&[]);
        let mut store = SegmentStore::open(dir.path(), false).unwrap();
        TranscriptionDriver::new(&service, &cfg, None)
            .run(&mut store, &track, &segments, 1)
            .await
            .unwrap();

        assert_eq!(service.calls(), vec![1, 2]);
        assert!((0..3).all(|i| store.is_done(i)));
    }
}
