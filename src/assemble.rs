// Transcript assembly
//
// Fragments carry segment-relative cue times. Assembly shifts each fragment by
// its segment's start and concatenates them in index order. Text at segment
// boundaries is not reconciled: cuts are placed inside silence, so a phrase
// split across two segments is a known approximation rather than something
// repaired here.

use tracing::{debug, info};

use crate::error::{Result, SubversesError};
use crate::segment::Segment;
use crate::store::{SegmentStore, TranscriptFragment};
use crate::subtitle::{Cue, Transcript};

/// Merge fragments into one transcript on the global timeline
pub fn assemble(
    segments: &[Segment],
    fragments: &[TranscriptFragment],
    language: &str,
) -> Result<Transcript> {
    if segments.len() != fragments.len() {
        return Err(SubversesError::Invariant(format!(
            "{} segment(s) but {} transcript fragment(s)",
            segments.len(),
            fragments.len()
        )));
    }

    let mut cues: Vec<Cue> = Vec::new();
    for (segment, fragment) in segments.iter().zip(fragments) {
        if segment.index != fragment.segment_index {
            return Err(SubversesError::Invariant(format!(
                "fragment for segment {} found in position of segment {}",
                fragment.segment_index, segment.index
            )));
        }

        if let Some((position, cue)) = fragment.first_invalid_cue() {
            return Err(SubversesError::Invariant(format!(
                "segment {} cue {} ends at {} ms but starts at {} ms",
                segment.index, position, cue.end_ms, cue.start_ms
            )));
        }

        let offset = segment.start_ms();
        cues.extend(fragment.cues.iter().map(|cue| cue.shifted(offset)));
        debug!(
            "Segment {}: {} cue(s) offset by {} ms",
            segment.index,
            fragment.cues.len(),
            offset
        );
    }

    info!("Assembled {} cue(s) from {} segment(s)", cues.len(), segments.len());
    Ok(Transcript::new(cues, language))
}

/// Assemble from the fragments held by a store; every segment must be done
pub fn assemble_from_store(
    store: &SegmentStore,
    segments: &[Segment],
    language: &str,
) -> Result<Transcript> {
    let fragments = store.done_fragments(segments.len())?;
    assemble(segments, &fragments, language)
}
