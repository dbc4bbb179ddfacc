//! Subverses - translated subtitles for YouTube videos
//!
//! Audio is split at silences, each segment is transcribed by a remote
//! speech-to-text service with retry and resume, the fragments are merged
//! into one timed transcript, and the transcript is translated in chunks
//! that keep every cue's timing.

pub mod assemble;
pub mod cli;
pub mod config;
pub mod error;
pub mod language;
pub mod media;
pub mod openai;
pub mod segment;
pub mod source;
pub mod store;
pub mod subtitle;
pub mod transcribe;
pub mod translate;
pub mod workflow;
