//! Silence-based audio segmentation.
//!
//! The track is scanned in 10 ms frames. A run of frames whose RMS level stays
//! at or below the silence threshold for at least the minimum silence length
//! yields a cut point; consecutive cut points bound the pieces, which are then
//! packed in order into segments that fit the provider's upload limit.
//!
//! Segmentation is a pure function of (samples, thresholds), so segment
//! indices stay stable between runs on the same audio.

use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::SegmentationConfig;
use crate::error::{Result, SubversesError};

/// Bytes of the canonical WAV header written by `encode_wav`
const WAV_HEADER_BYTES: u64 = 44;
/// Bytes per encoded sample (16-bit mono)
const BYTES_PER_SAMPLE: u64 = 2;
const FRAMES_PER_SECOND: u32 = 100;

/// Decoded mono audio
#[derive(Debug, Clone)]
pub struct AudioTrack {
    /// Samples normalized to [-1.0, 1.0]
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioTrack {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SubversesError::Audio("sample rate must be positive".to_string()));
        }
        Ok(Self { samples, sample_rate })
    }

    /// Load a WAV file, mixing all channels down to mono
    pub fn from_wav<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path).map_err(|e| {
            SubversesError::Audio(format!("Failed to open WAV file {}: {}", path.display(), e))
        })?;

        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };

        debug!(
            "Loaded {} ({} Hz, {} channel(s), {} samples)",
            path.display(),
            spec.sample_rate,
            channels,
            samples.len()
        );

        Self::new(samples, spec.sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        samples_to_ms(self.samples.len(), self.sample_rate)
    }
}

/// A contiguous, silence-bounded slice of the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub start_sample: usize,
    pub end_sample: usize,
    pub sample_rate: u32,
}

impl Segment {
    pub fn start_ms(&self) -> u64 {
        samples_to_ms(self.start_sample, self.sample_rate)
    }

    pub fn end_ms(&self) -> u64 {
        samples_to_ms(self.end_sample, self.sample_rate)
    }

    pub fn len(&self) -> usize {
        self.end_sample - self.start_sample
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn audio_slice<'a>(&self, track: &'a AudioTrack) -> &'a [f32] {
        &track.samples()[self.start_sample..self.end_sample]
    }

    /// The segment's audio as a standalone 16-bit mono WAV file
    pub fn to_wav_bytes(&self, track: &AudioTrack) -> Result<Vec<u8>> {
        encode_wav(self.audio_slice(track), self.sample_rate)
    }
}

pub struct SilenceSegmenter {
    config: SegmentationConfig,
}

impl SilenceSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    /// Split the track into ordered segments covering it without gaps
    pub fn segment(&self, track: &AudioTrack) -> Result<Vec<Segment>> {
        if track.is_empty() {
            return Err(SubversesError::Audio("audio track is empty".to_string()));
        }

        info!(
            "Detecting silence (threshold {} dB, min length {}s)",
            self.config.silence_threshold, self.config.min_silence_len_sec
        );

        let cuts = self.detect_cut_points(track);
        info!("Detected {} silence-bounded pieces", cuts.len() + 1);

        let mut bounds = Vec::with_capacity(cuts.len() + 2);
        bounds.push(0);
        bounds.extend(cuts);
        bounds.push(track.len());

        let packed = self.pack_pieces(&bounds, track.sample_rate());

        if packed.len() > self.config.max_segments {
            return Err(SubversesError::Invariant(format!(
                "too many segments detected: {} > {}",
                packed.len(),
                self.config.max_segments
            )));
        }

        let segments: Vec<Segment> = packed
            .into_iter()
            .enumerate()
            .map(|(index, (start_sample, end_sample))| Segment {
                index,
                start_sample,
                end_sample,
                sample_rate: track.sample_rate(),
            })
            .collect();

        info!("Audio split into {} segment(s)", segments.len());
        Ok(segments)
    }

    /// Sample positions strictly inside the track where a qualifying silence is cut
    pub fn detect_cut_points(&self, track: &AudioTrack) -> Vec<usize> {
        let rate = track.sample_rate();
        let frame_len = (rate / FRAMES_PER_SECOND).max(1) as usize;
        let min_silence_samples = ((self.config.min_silence_len_sec * rate as f64).round() as usize).max(1);
        let threshold = self.config.silence_threshold as f32;

        let mut cuts = Vec::new();
        let mut run_start: Option<usize> = None;

        let close_run = |start: usize, end: usize, cuts: &mut Vec<usize>| {
            if end - start >= min_silence_samples {
                let cut = start + min_silence_samples / 2;
                if cut > 0 && cut < track.len() {
                    cuts.push(cut);
                }
            }
        };

        for (frame_idx, frame) in track.samples().chunks(frame_len).enumerate() {
            let frame_start = frame_idx * frame_len;
            if level_dbfs(frame) <= threshold {
                run_start.get_or_insert(frame_start);
            } else if let Some(start) = run_start.take() {
                close_run(start, frame_start, &mut cuts);
            }
        }
        if let Some(start) = run_start {
            close_run(start, track.len(), &mut cuts);
        }

        cuts
    }

    /// Greedily merge adjacent pieces while the encoded size fits the limit
    fn pack_pieces(&self, bounds: &[usize], sample_rate: u32) -> Vec<(usize, usize)> {
        let max_samples = (self.config.max_segment_bytes.saturating_sub(WAV_HEADER_BYTES)
            / BYTES_PER_SAMPLE)
            .max(1) as usize;

        let mut segments = Vec::new();
        let mut group_start = bounds[0];
        let mut group_end = bounds[0];

        for piece in bounds.windows(2) {
            let (start, end) = (piece[0], piece[1]);
            if end - start > max_samples {
                warn!(
                    "Silence-bounded piece at {} ms is {} ms long and exceeds the clip size limit",
                    samples_to_ms(start, sample_rate),
                    samples_to_ms(end - start, sample_rate)
                );
            }

            if group_end > group_start && end - group_start > max_samples {
                segments.push((group_start, group_end));
                group_start = start;
            }
            group_end = end;
        }
        segments.push((group_start, group_end));

        segments
    }
}

/// RMS level of a frame in dBFS; digital silence is -inf
fn level_dbfs(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return f32::NEG_INFINITY;
    }
    let mean_square = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    10.0 * mean_square.log10()
}

fn samples_to_ms(samples: usize, sample_rate: u32) -> u64 {
    samples as u64 * 1000 / sample_rate as u64
}

/// Encode samples as 16-bit PCM mono WAV
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(
        WAV_HEADER_BYTES as usize + samples.len() * BYTES_PER_SAMPLE as usize,
    ));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in samples {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
