//! On-disk run state for one video.
//!
//! Layout of a working directory:
//!
//! ```text
//! <work_dir>/state.json                 per-segment SegmentState (resume marker)
//! <work_dir>/segments/segment_NNN.wav   audio slice sent for transcription
//! <work_dir>/fragments/segment_NNN.json TranscriptFragment, segment-relative times
//! <work_dir>/translation/<lang>/chunk_NNN.json  translated chunk checkpoints
//! ```
//!
//! A fragment is written (write-then-rename) before its segment is flipped to
//! done, and a done status whose fragment is missing is demoted on load, so a
//! crash can never leave a done segment without its transcript. With
//! skip-existing on, a fragment that outlived its state (a crash between the
//! two writes, or a lost `state.json`) is adopted as done when it matches the
//! segment's sample bounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SubversesError};
use crate::segment::Segment;
use crate::subtitle::Cue;

const STATE_FILE: &str = "state.json";
const SEGMENTS_DIR: &str = "segments";
const FRAGMENTS_DIR: &str = "fragments";
const TRANSLATION_DIR: &str = "translation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentState {
    pub segment_index: usize,
    pub status: SegmentStatus,
    pub retry_count: u32,
    pub start_sample: usize,
    pub end_sample: usize,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Transcript of one segment; cue times are relative to the segment start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    pub segment_index: usize,
    pub start_sample: usize,
    pub end_sample: usize,
    pub cues: Vec<Cue>,
}

impl TranscriptFragment {
    pub fn new(segment: &Segment, cues: Vec<Cue>) -> Self {
        Self {
            segment_index: segment.index,
            start_sample: segment.start_sample,
            end_sample: segment.end_sample,
            cues,
        }
    }

    /// Position and cue of the first cue that does not end after it starts
    pub fn first_invalid_cue(&self) -> Option<(usize, &Cue)> {
        self.cues.iter().enumerate().find(|(_, cue)| cue.end_ms <= cue.start_ms)
    }

    fn matches(&self, index: usize, start_sample: usize, end_sample: usize) -> bool {
        self.segment_index == index
            && self.start_sample == start_sample
            && self.end_sample == end_sample
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreManifest {
    run_id: Option<Uuid>,
    segments: BTreeMap<usize, SegmentState>,
}

pub struct SegmentStore {
    work_dir: PathBuf,
    skip_existing: bool,
    manifest: StoreManifest,
}

impl SegmentStore {
    /// Open (or create) the store in `work_dir`, reconciling state with the fragments on disk
    pub fn open<P: AsRef<Path>>(work_dir: P, skip_existing: bool) -> Result<Self> {
        let work_dir = work_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(work_dir.join(SEGMENTS_DIR))?;
        std::fs::create_dir_all(work_dir.join(FRAGMENTS_DIR))?;

        let state_path = work_dir.join(STATE_FILE);
        let mut manifest: StoreManifest = if state_path.exists() {
            let content = std::fs::read_to_string(&state_path)?;
            serde_json::from_str(&content).map_err(|e| {
                SubversesError::Invariant(format!(
                    "corrupt segment state {}: {}",
                    state_path.display(),
                    e
                ))
            })?
        } else {
            StoreManifest::default()
        };

        for state in manifest.segments.values_mut() {
            let fragment_exists = fragment_path(&work_dir, state.segment_index).exists();
            match state.status {
                SegmentStatus::Done if !fragment_exists => {
                    warn!(
                        "Segment {} was marked done but has no fragment; marking it pending",
                        state.segment_index
                    );
                    state.status = SegmentStatus::Pending;
                }
                SegmentStatus::InProgress => {
                    debug!("Segment {} was interrupted; marking it pending", state.segment_index);
                    state.status = SegmentStatus::Pending;
                }
                _ => {}
            }

            if skip_existing
                && fragment_exists
                && state.status != SegmentStatus::Done
                && existing_fragment(&work_dir, state.segment_index, state.start_sample, state.end_sample)
                    .is_some()
            {
                info!(
                    "Segment {} has a transcript fragment on disk; marking it done",
                    state.segment_index
                );
                state.status = SegmentStatus::Done;
                state.last_error = None;
            }
        }

        let run_id = Uuid::new_v4();
        manifest.run_id = Some(run_id);
        info!(
            "Opened segment store {} (run {}, {} known segment(s))",
            work_dir.display(),
            run_id,
            manifest.segments.len()
        );

        let store = Self {
            work_dir,
            skip_existing,
            manifest,
        };
        store.persist()?;
        Ok(store)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn skip_existing(&self) -> bool {
        self.skip_existing
    }

    /// Register a discovered segment. A changed layout for the index discards its old state.
    pub fn record_pending(&mut self, segment: &Segment) -> Result<()> {
        let index = segment.index;
        if let Some(existing) = self.manifest.segments.get(&index) {
            if existing.start_sample == segment.start_sample
                && existing.end_sample == segment.end_sample
            {
                return Ok(());
            }
            warn!(
                "Segment {} boundaries changed since the last run; discarding its transcript",
                index
            );
            remove_if_exists(&fragment_path(&self.work_dir, index))?;
        }

        let adopted = !self.manifest.segments.contains_key(&index)
            && self.skip_existing
            && existing_fragment(&self.work_dir, index, segment.start_sample, segment.end_sample)
                .is_some();
        if adopted {
            info!("Segment {} has a transcript fragment on disk; marking it done", index);
        }

        self.manifest.segments.insert(
            index,
            SegmentState {
                segment_index: index,
                status: if adopted {
                    SegmentStatus::Done
                } else {
                    SegmentStatus::Pending
                },
                retry_count: 0,
                start_sample: segment.start_sample,
                end_sample: segment.end_sample,
                last_error: None,
                updated_at: Utc::now(),
            },
        );
        self.persist()
    }

    /// Drop state for indices at or beyond `count` (the layout shrank)
    pub fn truncate(&mut self, count: usize) -> Result<()> {
        let stale: Vec<usize> = self.manifest.segments.range(count..).map(|(i, _)| *i).collect();
        if stale.is_empty() {
            return Ok(());
        }
        for index in stale {
            self.manifest.segments.remove(&index);
            remove_if_exists(&fragment_path(&self.work_dir, index))?;
        }
        self.persist()
    }

    pub fn mark_in_progress(&mut self, index: usize) -> Result<()> {
        self.update(index, |state| {
            state.status = SegmentStatus::InProgress;
        })
    }

    /// Persist the fragment, then flip the segment to done. Re-marking a done segment is a no-op.
    pub fn mark_done(&mut self, index: usize, fragment: &TranscriptFragment) -> Result<()> {
        if fragment.segment_index != index {
            return Err(SubversesError::Invariant(format!(
                "fragment for segment {} offered as segment {}",
                fragment.segment_index, index
            )));
        }
        let state = self.manifest.segments.get(&index).ok_or_else(|| {
            SubversesError::Invariant(format!("segment {} was never recorded", index))
        })?;
        if !fragment.matches(index, state.start_sample, state.end_sample) {
            return Err(SubversesError::Invariant(format!(
                "fragment for segment {} covers samples {}..{}, segment is {}..{}",
                index, fragment.start_sample, fragment.end_sample, state.start_sample, state.end_sample
            )));
        }
        if let Some((position, cue)) = fragment.first_invalid_cue() {
            return Err(SubversesError::Invariant(format!(
                "segment {} cue {} ends at {} ms but starts at {} ms",
                index, position, cue.end_ms, cue.start_ms
            )));
        }
        if self.is_done(index) {
            debug!("Segment {} already done", index);
            return Ok(());
        }

        let content = serde_json::to_vec_pretty(fragment)?;
        write_atomic(&fragment_path(&self.work_dir, index), &content)?;

        self.update(index, |state| {
            state.status = SegmentStatus::Done;
            state.last_error = None;
        })
    }

    /// Count one failed attempt; earlier output is kept
    pub fn record_retry(&mut self, index: usize, reason: &str) -> Result<()> {
        self.update(index, |state| {
            state.retry_count += 1;
            state.last_error = Some(reason.to_string());
        })
    }

    /// Terminal failure for this run; earlier output is kept
    pub fn mark_failed(&mut self, index: usize, reason: &str) -> Result<()> {
        self.update(index, |state| {
            state.status = SegmentStatus::Failed;
            state.last_error = Some(reason.to_string());
        })
    }

    /// Put a done segment back to pending so it is transcribed again
    pub fn reset(&mut self, index: usize) -> Result<()> {
        self.update(index, |state| {
            state.status = SegmentStatus::Pending;
            state.retry_count = 0;
            state.last_error = None;
        })
    }

    pub fn is_done(&self, index: usize) -> bool {
        self.manifest
            .segments
            .get(&index)
            .is_some_and(|s| s.status == SegmentStatus::Done)
            && fragment_path(&self.work_dir, index).exists()
    }

    /// Whether transcription of `index` can be skipped this run
    pub fn can_skip(&self, index: usize) -> bool {
        self.skip_existing && self.is_done(index)
    }

    /// Lowest known index at or after `start_override` that still needs transcription
    pub fn next_resume_index(&self, start_override: usize) -> Option<usize> {
        self.manifest
            .segments
            .keys()
            .copied()
            .filter(|i| *i >= start_override)
            .find(|i| !self.can_skip(*i))
    }

    pub fn state(&self, index: usize) -> Option<&SegmentState> {
        self.manifest.segments.get(&index)
    }

    pub fn states(&self) -> impl Iterator<Item = &SegmentState> {
        self.manifest.segments.values()
    }

    pub fn load_fragment(&self, index: usize) -> Result<TranscriptFragment> {
        let path = fragment_path(&self.work_dir, index);
        if !self.is_done(index) {
            return Err(SubversesError::Invariant(format!(
                "segment {} has no completed transcript fragment",
                index
            )));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Fragments 0..count in index order; fails on the first segment that is not done
    pub fn done_fragments(&self, count: usize) -> Result<Vec<TranscriptFragment>> {
        (0..count).map(|index| self.load_fragment(index)).collect()
    }

    /// Keep the audio slice next to its state for inspection and reruns
    pub fn write_segment_audio(&self, index: usize, wav: &[u8]) -> Result<PathBuf> {
        let path = self
            .work_dir
            .join(SEGMENTS_DIR)
            .join(format!("segment_{:03}.wav", index));
        write_atomic(&path, wav)?;
        Ok(path)
    }

    fn update<F: FnOnce(&mut SegmentState)>(&mut self, index: usize, f: F) -> Result<()> {
        let state = self.manifest.segments.get_mut(&index).ok_or_else(|| {
            SubversesError::Invariant(format!("segment {} was never recorded", index))
        })?;
        f(state);
        state.updated_at = Utc::now();
        self.persist()
    }

    /// Segment states of a working directory without opening (and rewriting) the store
    pub fn read_states<P: AsRef<Path>>(work_dir: P) -> Result<Vec<SegmentState>> {
        let state_path = work_dir.as_ref().join(STATE_FILE);
        if !state_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&state_path)?;
        let manifest: StoreManifest = serde_json::from_str(&content)?;
        Ok(manifest.segments.into_values().collect())
    }

    fn persist(&self) -> Result<()> {
        let content = serde_json::to_vec_pretty(&self.manifest)?;
        write_atomic(&self.work_dir.join(STATE_FILE), &content)
    }
}

/// Entry persisted per translated chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCheckpoint {
    pub chunk_index: usize,
    pub fingerprint: String,
    pub lines: Vec<String>,
    pub model: String,
    pub cached_at: DateTime<Utc>,
}

/// Translated chunks of one target language, reused when the source chunk is unchanged
pub struct TranslationCheckpoint {
    dir: PathBuf,
}

impl TranslationCheckpoint {
    pub fn new<P: AsRef<Path>>(work_dir: P, target_language: &str) -> Self {
        Self {
            dir: work_dir
                .as_ref()
                .join(TRANSLATION_DIR)
                .join(sanitize_component(&target_language.to_lowercase())),
        }
    }

    /// Stable key for (source lines, model, prompt context)
    pub fn fingerprint(lines: &[String], model: &str, context: &str) -> String {
        let mut hasher = DefaultHasher::new();
        lines.hash(&mut hasher);
        model.hash(&mut hasher);
        context.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    pub fn load(&self, chunk_index: usize, fingerprint: &str) -> Option<Vec<String>> {
        let content = std::fs::read_to_string(self.chunk_path(chunk_index)).ok()?;
        match serde_json::from_str::<ChunkCheckpoint>(&content) {
            Ok(entry) if entry.fingerprint == fingerprint => Some(entry.lines),
            Ok(_) => {
                debug!("Checkpoint for chunk {} is stale", chunk_index);
                None
            }
            Err(e) => {
                warn!("Failed to parse checkpoint for chunk {}: {}", chunk_index, e);
                None
            }
        }
    }

    pub fn save(&self, chunk_index: usize, fingerprint: &str, lines: &[String], model: &str) -> Result<()> {
        let entry = ChunkCheckpoint {
            chunk_index,
            fingerprint: fingerprint.to_string(),
            lines: lines.to_vec(),
            model: model.to_string(),
            cached_at: Utc::now(),
        };
        write_atomic(&self.chunk_path(chunk_index), &serde_json::to_vec_pretty(&entry)?)
    }

    fn chunk_path(&self, chunk_index: usize) -> PathBuf {
        self.dir.join(format!("chunk_{:03}.json", chunk_index))
    }
}

fn fragment_path(work_dir: &Path, index: usize) -> PathBuf {
    work_dir
        .join(FRAGMENTS_DIR)
        .join(format!("segment_{:03}.json", index))
}

/// Fragment on disk for `index`, if it parses and matches the given sample bounds
fn existing_fragment(
    work_dir: &Path,
    index: usize,
    start_sample: usize,
    end_sample: usize,
) -> Option<TranscriptFragment> {
    let content = std::fs::read_to_string(fragment_path(work_dir, index)).ok()?;
    match serde_json::from_str::<TranscriptFragment>(&content) {
        Ok(fragment)
            if fragment.matches(index, start_sample, end_sample)
                && fragment.first_invalid_cue().is_none() =>
        {
            Some(fragment)
        }
        Ok(_) => {
            debug!("Fragment on disk for segment {} does not match its layout", index);
            None
        }
        Err(e) => {
            warn!("Failed to parse fragment for segment {}: {}", index, e);
            None
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temp file in the same directory and rename into place
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SubversesError::Io(e.error))?;
    Ok(())
}

/// Make a string safe to use as a single path component
pub fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(index: usize, start: usize, end: usize) -> Segment {
        Segment {
            index,
            start_sample: start,
            end_sample: end,
            sample_rate: 16_000,
        }
    }

    fn fragment(index: usize, text: &str) -> TranscriptFragment {
        TranscriptFragment::new(
            &segment(index, index * 100, (index + 1) * 100),
            vec![Cue::new(0, 1_000, text)],
        )
    }

    fn store_with(dir: &Path, count: usize, skip_existing: bool) -> SegmentStore {
        let mut store = SegmentStore::open(dir, skip_existing).unwrap();
        for i in 0..count {
            store.record_pending(&segment(i, i * 100, (i + 1) * 100)).unwrap();
        }
        store
    }

    #[test]
    fn test_mark_done_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), 2, true);

        store.mark_done(0, &fragment(0, "first")).unwrap();
        store.mark_done(0, &fragment(0, "second")).unwrap();

        assert!(store.is_done(0));
        assert_eq!(store.load_fragment(0).unwrap().cues[0].text, "first");
    }

    #[test]
    fn test_failure_keeps_retries_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), 1, true);
        store.mark_done(0, &fragment(0, "kept")).unwrap();
        store.reset(0).unwrap();

        store.record_retry(0, "timeout").unwrap();
        store.record_retry(0, "timeout").unwrap();
        store.mark_failed(0, "gave up").unwrap();

        let state = store.state(0).unwrap();
        assert_eq!(state.status, SegmentStatus::Failed);
        assert_eq!(state.retry_count, 2);
        assert_eq!(state.last_error.as_deref(), Some("gave up"));
        assert!(fragment_path(dir.path(), 0).exists());
    }

    #[test]
    fn test_next_resume_index_honors_start_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), 4, true);
        store.mark_done(0, &fragment(0, "a")).unwrap();
        store.mark_done(2, &fragment(2, "c")).unwrap();

        assert_eq!(store.next_resume_index(0), Some(1));
        assert_eq!(store.next_resume_index(2), Some(3));
        store.mark_done(1, &fragment(1, "b")).unwrap();
        store.mark_done(3, &fragment(3, "d")).unwrap();
        assert_eq!(store.next_resume_index(0), None);
    }

    #[test]
    fn test_read_states_without_opening() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SegmentStore::read_states(dir.path()).unwrap().is_empty());

        let mut store = store_with(dir.path(), 2, true);
        store.mark_done(1, &fragment(1, "b")).unwrap();

        let states = SegmentStore::read_states(dir.path()).unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].status, SegmentStatus::Pending);
        assert_eq!(states[1].status, SegmentStatus::Done);
    }

    #[test]
    fn test_without_skip_existing_done_segments_are_redone() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), 2, false);
        store.mark_done(0, &fragment(0, "a")).unwrap();

        assert!(store.is_done(0));
        assert!(!store.can_skip(0));
        assert_eq!(store.next_resume_index(0), Some(0));
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = store_with(dir.path(), 3, true);
            store.mark_done(0, &fragment(0, "a")).unwrap();
            store.mark_in_progress(1).unwrap();
        }

        let store = SegmentStore::open(dir.path(), true).unwrap();
        assert!(store.is_done(0));
        assert_eq!(store.state(1).unwrap().status, SegmentStatus::Pending);
        assert_eq!(store.next_resume_index(0), Some(1));
    }

    #[test]
    fn test_done_without_fragment_is_demoted() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = store_with(dir.path(), 1, true);
            store.mark_done(0, &fragment(0, "a")).unwrap();
        }
        std::fs::remove_file(fragment_path(dir.path(), 0)).unwrap();

        let store = SegmentStore::open(dir.path(), true).unwrap();
        assert!(!store.is_done(0));
        assert_eq!(store.state(0).unwrap().status, SegmentStatus::Pending);
    }

    #[test]
    fn test_changed_boundaries_discard_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), 1, true);
        store.mark_done(0, &fragment(0, "a")).unwrap();

        store.record_pending(&segment(0, 0, 150)).unwrap();
        assert!(!store.is_done(0));
        assert!(!fragment_path(dir.path(), 0).exists());
    }

    #[test]
    fn test_missing_fragment_names_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), 3, true);
        store.mark_done(0, &fragment(0, "a")).unwrap();

        let err = store.done_fragments(3).unwrap_err();
        assert!(err.to_string().contains("segment 1"));
    }

    #[test]
    fn test_fragment_on_disk_adopted_after_crash_before_state_write() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = store_with(dir.path(), 2, true);
            store.mark_in_progress(0).unwrap();
        }
        // The fragment landed, the done flip in state.json did not
        let content = serde_json::to_vec_pretty(&fragment(0, "a")).unwrap();
        write_atomic(&fragment_path(dir.path(), 0), &content).unwrap();

        let store = SegmentStore::open(dir.path(), true).unwrap();
        assert!(store.is_done(0));
        assert_eq!(store.next_resume_index(0), Some(1));

        let store = SegmentStore::open(dir.path(), false).unwrap();
        assert!(store.is_done(0));
        assert!(!store.can_skip(0));
    }

    #[test]
    fn test_fragment_on_disk_adopted_without_state_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = store_with(dir.path(), 2, true);
            store.mark_done(0, &fragment(0, "a")).unwrap();
            store.mark_done(1, &fragment(1, "b")).unwrap();
        }
        std::fs::remove_file(dir.path().join(STATE_FILE)).unwrap();

        let store = store_with(dir.path(), 2, true);
        assert_eq!(store.next_resume_index(0), None);
        assert_eq!(store.load_fragment(1).unwrap().cues[0].text, "b");

        std::fs::remove_file(dir.path().join(STATE_FILE)).unwrap();
        let store = store_with(dir.path(), 2, false);
        assert!(!store.is_done(0));
        assert_eq!(store.next_resume_index(0), Some(0));
    }

    #[test]
    fn test_fragment_with_other_bounds_not_adopted() {
        let dir = tempfile::tempdir().unwrap();
        let stale = TranscriptFragment::new(&segment(0, 0, 250), vec![Cue::new(0, 1_000, "old")]);
        write_atomic(&fragment_path(dir.path(), 0), &serde_json::to_vec(&stale).unwrap()).unwrap();

        let store = store_with(dir.path(), 1, true);
        assert!(!store.is_done(0));
        assert_eq!(store.next_resume_index(0), Some(0));
    }

    #[test]
    fn test_fragment_with_zero_length_cue_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), 1, true);
        let glitch = TranscriptFragment::new(&segment(0, 0, 100), vec![Cue::new(900, 900, "glitch")]);

        let err = store.mark_done(0, &glitch).unwrap_err();
        assert!(matches!(err, SubversesError::Invariant(ref m) if m.contains("segment 0 cue 0")));
        assert!(!store.is_done(0));
        assert!(!fragment_path(dir.path(), 0).exists());
    }

    #[test]
    fn test_fragment_index_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with(dir.path(), 2, true);
        assert!(store.mark_done(1, &fragment(0, "a")).is_err());
        assert!(!store.is_done(1));
    }

    #[test]
    fn test_translation_checkpoint_matches_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = TranslationCheckpoint::new(dir.path(), "Polish");
        let lines = vec!["hello".to_string()];
        let fp = TranslationCheckpoint::fingerprint(&lines, "gpt", "");

        checkpoint.save(0, &fp, &["cześć".to_string()], "gpt").unwrap();
        assert_eq!(checkpoint.load(0, &fp), Some(vec!["cześć".to_string()]));
        assert_eq!(checkpoint.load(0, "other"), None);
        assert_eq!(checkpoint.load(1, &fp), None);
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("a/b:c"), "a_b_c");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }
}
