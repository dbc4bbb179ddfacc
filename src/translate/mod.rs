// Chunked translation
//
// Cues are grouped into chunks that respect the provider's input limits
// without splitting a cue. Each chunk is translated on its own with the same
// context prompt; the reply must have one line per cue of the chunk. Timings
// are copied from the source cues, only the text changes.

pub mod common;
pub mod openai;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use common::*;
use crate::config::TranslationConfig;
use crate::error::{Result, SubversesError};
use crate::store::TranslationCheckpoint;
use crate::subtitle::{Cue, Transcript, word_wrap};

/// Remote text translation service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Translated lines, one per request line and in the same order
    async fn translate(&self, request: &TranslationRequest) -> Result<Vec<String>>;
}

/// Partition cues into consecutive chunks of at most `max_cues` cues and
/// `max_chars` characters of text. A cue longer than `max_chars` gets a chunk of its own.
pub fn chunk_cues(cues: &[Cue], max_chars: usize, max_cues: usize) -> Vec<Range<usize>> {
    let max_cues = max_cues.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chars = 0;

    for (i, cue) in cues.iter().enumerate() {
        let len = cue.text.chars().count();
        let count = i - start;
        if count > 0 && (count >= max_cues || chars + len > max_chars) {
            chunks.push(start..i);
            start = i;
            chars = 0;
        }
        chars += len;
    }
    if start < cues.len() {
        chunks.push(start..cues.len());
    }

    chunks
}

pub struct TranslationDriver<'a> {
    service: &'a dyn TranslationService,
    config: &'a TranslationConfig,
    checkpoint: Option<TranslationCheckpoint>,
}

impl<'a> TranslationDriver<'a> {
    pub fn new(service: &'a dyn TranslationService, config: &'a TranslationConfig) -> Self {
        Self {
            service,
            config,
            checkpoint: None,
        }
    }

    /// Reuse and record translated chunks in `checkpoint`
    pub fn with_checkpoint(mut self, checkpoint: TranslationCheckpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub async fn run(&self, transcript: &Transcript, target_language: &str) -> Result<Transcript> {
        let chunks = chunk_cues(
            &transcript.cues,
            self.config.max_chunk_chars,
            self.config.max_chunk_cues,
        );
        info!(
            "Translating {} cue(s) from {} to {} in {} chunk(s)",
            transcript.len(),
            transcript.language,
            target_language,
            chunks.len()
        );

        let progress = ProgressBar::new(chunks.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.green/blue}] {pos}/{len} chunks ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        progress.set_message("Translating");

        let mut translated: Vec<Cue> = Vec::with_capacity(transcript.len());
        for (chunk_index, range) in chunks.into_iter().enumerate() {
            let source = &transcript.cues[range];
            let request = TranslationRequest {
                chunk_index,
                lines: source.iter().map(|cue| cue.text.clone()).collect(),
                source_language: transcript.language.clone(),
                target_language: target_language.to_string(),
                context_prompt: self.config.additional_prompt.clone(),
                model: self.config.model.clone(),
                temperature: self.config.temperature,
            };

            let lines = match self.translate_chunk(&request).await {
                Ok(lines) => lines,
                Err(e) => {
                    progress.abandon();
                    return Err(e);
                }
            };

            translated.extend(source.iter().zip(lines).map(|(cue, line)| Cue {
                start_ms: cue.start_ms,
                end_ms: cue.end_ms,
                text: word_wrap(&line, self.config.line_width),
            }));
            progress.inc(1);
        }

        progress.finish_with_message("Translated");
        Ok(Transcript::new(translated, target_language))
    }

    /// Translate one chunk, from the checkpoint when its source is unchanged
    pub async fn translate_chunk(&self, request: &TranslationRequest) -> Result<Vec<String>> {
        let fingerprint = TranslationCheckpoint::fingerprint(
            &request.lines,
            &request.model,
            &checkpoint_context(request),
        );

        if let Some(checkpoint) = &self.checkpoint {
            if let Some(lines) = checkpoint.load(request.chunk_index, &fingerprint) {
                if lines.len() == request.lines.len() {
                    debug!("Chunk {} taken from checkpoint", request.chunk_index);
                    return Ok(lines);
                }
                warn!("Checkpoint for chunk {} has the wrong line count; translating again", request.chunk_index);
            }
        }

        let lines = self.request_with_retries(request).await?;

        if let Some(checkpoint) = &self.checkpoint {
            checkpoint.save(request.chunk_index, &fingerprint, &lines, &request.model)?;
        }
        Ok(lines)
    }

    async fn request_with_retries(&self, request: &TranslationRequest) -> Result<Vec<String>> {
        let expected = request.lines.len();
        let mut transient_failures = 0;
        let mut mismatches = 0;

        loop {
            match self.service.translate(request).await {
                Ok(lines) if lines.len() == expected => return Ok(lines),
                Ok(lines) => {
                    mismatches += 1;
                    if mismatches > 1 {
                        return Err(SubversesError::ChunkMismatch {
                            chunk: request.chunk_index,
                            expected,
                            actual: lines.len(),
                        });
                    }
                    warn!(
                        "Chunk {} came back with {} line(s) instead of {}; retrying once",
                        request.chunk_index,
                        lines.len(),
                        expected
                    );
                }
                Err(e) if e.is_transient() && transient_failures < self.config.max_retries => {
                    transient_failures += 1;
                    warn!(
                        "Chunk {} attempt failed ({}/{} retries): {}",
                        request.chunk_index, transient_failures, self.config.max_retries, e
                    );
                    if self.config.retry_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.retry_delay_ms * transient_failures as u64,
                        ))
                        .await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// Everything besides the lines and model that shapes the reply
fn checkpoint_context(request: &TranslationRequest) -> String {
    format!(
        "{}|{}|{}|{}",
        request.source_language,
        request.target_language,
        request.context_prompt.as_deref().unwrap_or_default(),
        request.temperature
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cue(i: u64, text: &str) -> Cue {
        Cue::new(i * 1_000, i * 1_000 + 800, text)
    }

    fn transcript(n: u64) -> Transcript {
        Transcript::new((0..n).map(|i| cue(i, &format!("line {}", i))).collect(), "en")
    }

    fn config(max_chunk_cues: usize) -> TranslationConfig {
        TranslationConfig {
            max_chunk_cues,
            retry_delay_ms: 0,
            line_width: 0,
            ..TranslationConfig::default()
        }
    }

    /// Upper-cases every line
    struct EchoService {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranslationService for EchoService {
        async fn translate(&self, request: &TranslationRequest) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(request.lines.iter().map(|l| l.to_uppercase()).collect())
        }
    }

    #[test]
    fn test_chunking_respects_cue_limit() {
        let cues = transcript(10).cues;
        assert_eq!(chunk_cues(&cues, 10_000, 4), vec![0..4, 4..8, 8..10]);
        assert_eq!(chunk_cues(&cues, 10_000, 100), vec![0..10]);
        assert!(chunk_cues(&[], 100, 4).is_empty());
    }

    #[test]
    fn test_chunking_respects_char_limit_without_splitting_cues() {
        let cues = vec![cue(0, "aaaa"), cue(1, "bbbb"), cue(2, "cccccccccccc"), cue(3, "d")];
        let chunks = chunk_cues(&cues, 8, 10);
        assert_eq!(chunks, vec![0..2, 2..3, 3..4]);

        let covered: Vec<usize> = chunks.into_iter().flatten().collect();
        assert_eq!(covered, (0..4).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_timings_are_preserved() {
        let service = EchoService { calls: AtomicUsize::new(0) };
        let cfg = config(3);
        let source = transcript(7);

        let translated = TranslationDriver::new(&service, &cfg)
            .run(&source, "Shouting")
            .await
            .unwrap();

        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        assert_eq!(translated.language, "Shouting");
        assert_eq!(translated.len(), source.len());
        for (src, dst) in source.cues.iter().zip(&translated.cues) {
            assert_eq!((src.start_ms, src.end_ms), (dst.start_ms, dst.end_ms));
            assert_eq!(dst.text, src.text.to_uppercase());
        }
    }

    #[tokio::test]
    async fn test_translated_text_is_wrapped() {
        let service = EchoService { calls: AtomicUsize::new(0) };
        let cfg = TranslationConfig {
            line_width: 10,
            ..config(8)
        };
        let source = Transcript::new(vec![cue(0, "one two three four")], "en");

        let translated = TranslationDriver::new(&service, &cfg).run(&source, "X").await.unwrap();
        assert_eq!(translated.cues[0].text, "ONE TWO\nTHREE FOUR");
    }

    #[tokio::test]
    async fn test_count_mismatch_is_retried_once_then_fatal() {
        let cfg = config(4);
        let mut service = MockTranslationService::new();
        service
            .expect_translate()
            .times(2)
            .returning(|req| Ok(req.lines[1..].to_vec()));

        let err = TranslationDriver::new(&service, &cfg)
            .run(&transcript(6), "Polish")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubversesError::ChunkMismatch { chunk: 0, expected: 4, actual: 3 }
        ));
    }

    #[tokio::test]
    async fn test_single_mismatch_recovers() {
        let cfg = config(4);
        let calls = AtomicUsize::new(0);
        let mut service = MockTranslationService::new();
        service.expect_translate().times(2).returning(move |req| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec!["merged".to_string()])
            } else {
                Ok(req.lines.clone())
            }
        });

        let translated = TranslationDriver::new(&service, &cfg)
            .run(&transcript(2), "Polish")
            .await
            .unwrap();
        assert_eq!(translated.len(), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let cfg = config(4);
        let mut service = MockTranslationService::new();
        service
            .expect_translate()
            .times(1)
            .returning(|_| Err(SubversesError::FatalRemote("401 Unauthorized".to_string())));

        let err = TranslationDriver::new(&service, &cfg)
            .run(&transcript(2), "Polish")
            .await
            .unwrap_err();
        assert!(matches!(err, SubversesError::FatalRemote(_)));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_up_to_limit() {
        let cfg = TranslationConfig {
            max_retries: 2,
            ..config(4)
        };
        let mut service = MockTranslationService::new();
        service
            .expect_translate()
            .times(3)
            .returning(|_| Err(SubversesError::TransientRemote("429".to_string())));

        let err = TranslationDriver::new(&service, &cfg)
            .run(&transcript(2), "Polish")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_request_carries_context_prompt() {
        let cfg = TranslationConfig {
            additional_prompt: Some("Use formal register.".to_string()),
            ..config(8)
        };
        let mut service = MockTranslationService::new();
        service
            .expect_translate()
            .withf(|req| {
                req.context_prompt.as_deref() == Some("Use formal register.")
                    && req.source_language == "en"
                    && req.target_language == "Polish"
            })
            .times(1)
            .returning(|req| Ok(req.lines.clone()));

        TranslationDriver::new(&service, &cfg)
            .run(&transcript(3), "Polish")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_checkpoint_skips_translated_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(2);
        let source = transcript(5);

        let first = EchoService { calls: AtomicUsize::new(0) };
        let expected = TranslationDriver::new(&first, &cfg)
            .with_checkpoint(TranslationCheckpoint::new(dir.path(), "Polish"))
            .run(&source, "Polish")
            .await
            .unwrap();
        assert_eq!(first.calls.load(Ordering::SeqCst), 3);

        let mut service = MockTranslationService::new();
        service.expect_translate().times(0);
        let again = TranslationDriver::new(&service, &cfg)
            .with_checkpoint(TranslationCheckpoint::new(dir.path(), "Polish"))
            .run(&source, "Polish")
            .await
            .unwrap();
        assert_eq!(again, expected);

        // A different prompt invalidates every chunk
        let cfg = TranslationConfig {
            additional_prompt: Some("Be brief.".to_string()),
            ..config(2)
        };
        let second = EchoService { calls: AtomicUsize::new(0) };
        TranslationDriver::new(&second, &cfg)
            .with_checkpoint(TranslationCheckpoint::new(dir.path(), "Polish"))
            .run(&source, "Polish")
            .await
            .unwrap();
        assert_eq!(second.calls.load(Ordering::SeqCst), 3);
    }
}
