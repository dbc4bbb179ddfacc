// Source acquisition
//
// Downloading is outside this crate. A SourceProvider hands the pipeline what
// is available for one video: a manual transcript, an audio file, a video
// file. The video identity names the working directory and output file, so
// every run for the same video lands in the same place.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, SubversesError};
use crate::store::sanitize_component;
use crate::subtitle::{self, Cue};

const VIDEO_ID_LEN: usize = 11;

/// Stable identity of a YouTube video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoIdentity {
    pub video_id: String,
    pub url: String,
}

impl VideoIdentity {
    /// Accepts `watch?v=`, `youtu.be/`, `shorts/`, `embed/` and `live/` URLs or a bare id
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let video_id = extract_video_id(input).ok_or_else(|| {
            SubversesError::Config(format!("Not a YouTube video URL or id: '{}'", input))
        })?;
        Ok(Self {
            video_id,
            url: input.to_string(),
        })
    }

    pub fn work_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(sanitize_component(&self.video_id))
    }

    /// `<data_dir>/<id>.<language>.srt`
    pub fn output_path(&self, data_dir: &Path, language: &str) -> PathBuf {
        data_dir.join(format!(
            "{}.{}.srt",
            sanitize_component(&self.video_id),
            sanitize_component(&language.to_lowercase())
        ))
    }
}

fn extract_video_id(input: &str) -> Option<String> {
    if is_video_id(input) {
        return Some(input.to_string());
    }

    let rest = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"))
        .unwrap_or(input);
    let rest = rest.strip_prefix("www.").or_else(|| rest.strip_prefix("m.")).unwrap_or(rest);

    let candidate = if let Some(path) = rest.strip_prefix("youtu.be/") {
        path
    } else if let Some(path) = rest.strip_prefix("youtube.com/") {
        if let Some(query) = path.strip_prefix("watch?") {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("v="))?
        } else {
            ["shorts/", "embed/", "live/", "v/"]
                .iter()
                .find_map(|prefix| path.strip_prefix(prefix))?
        }
    } else {
        return None;
    };

    let id: String = candidate
        .chars()
        .take_while(|c| !matches!(c, '?' | '&' | '#' | '/'))
        .collect();
    is_video_id(&id).then_some(id)
}

fn is_video_id(value: &str) -> bool {
    value.len() == VIDEO_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// What is available for one video
#[derive(Debug, Clone)]
pub struct SourceMaterial {
    pub identity: VideoIdentity,
    /// Timed cues in the source language, if the video has them
    pub manual_transcript: Option<Vec<Cue>>,
    pub audio: Option<PathBuf>,
    pub video: Option<PathBuf>,
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn acquire(&self, identity: &VideoIdentity) -> Result<SourceMaterial>;
}

/// Files already on disk, e.g. fetched by a separate downloader
#[derive(Debug, Clone, Default)]
pub struct LocalSource {
    pub audio: Option<PathBuf>,
    pub manual_transcript: Option<PathBuf>,
    pub video: Option<PathBuf>,
}

impl LocalSource {
    pub fn new(audio: Option<PathBuf>) -> Self {
        Self {
            audio,
            ..Self::default()
        }
    }

    pub fn with_manual_transcript(mut self, path: Option<PathBuf>) -> Self {
        self.manual_transcript = path;
        self
    }

    pub fn with_video(mut self, path: Option<PathBuf>) -> Self {
        self.video = path;
        self
    }
}

fn existing(path: &Option<PathBuf>, what: &str) -> Result<Option<PathBuf>> {
    match path {
        Some(p) if !p.exists() => Err(SubversesError::FileNotFound(format!(
            "{} {}",
            what,
            p.display()
        ))),
        other => Ok(other.clone()),
    }
}

#[async_trait]
impl SourceProvider for LocalSource {
    async fn acquire(&self, identity: &VideoIdentity) -> Result<SourceMaterial> {
        let audio = existing(&self.audio, "audio file")?;
        let video = existing(&self.video, "video file")?;

        let manual_transcript = match existing(&self.manual_transcript, "manual transcript")? {
            Some(path) => {
                let cues = subtitle::read_srt(&path).await?;
                info!("Found manual transcript {} ({} cues)", path.display(), cues.len());
                Some(cues)
            }
            None => None,
        };

        debug!(
            "Source for {}: audio={:?} video={:?} manual transcript={}",
            identity.video_id,
            audio,
            video,
            manual_transcript.is_some()
        );

        Ok(SourceMaterial {
            identity: identity.clone(),
            manual_transcript,
            audio,
            video,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_parse_url_forms() {
        for input in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "m.youtube.com/watch?v=dQw4w9WgXcQ",
            "dQw4w9WgXcQ",
        ] {
            let identity = VideoIdentity::parse(input).unwrap();
            assert_eq!(identity.video_id, "dQw4w9WgXcQ", "{}", input);
        }
    }

    #[test]
    fn test_parse_rejects_other_urls() {
        assert!(VideoIdentity::parse("https://vimeo.com/12345678").is_err());
        assert!(VideoIdentity::parse("https://www.youtube.com/watch?list=PL123").is_err());
        assert!(VideoIdentity::parse("short").is_err());
    }

    #[test]
    fn test_paths_are_derived_from_id() {
        let identity = VideoIdentity::parse("https://youtu.be/a-b_c123456").unwrap();
        let data = Path::new("/data");
        assert_eq!(identity.work_dir(data), PathBuf::from("/data/a-b_c123456"));
        assert_eq!(
            identity.output_path(data, "Polish"),
            PathBuf::from("/data/a-b_c123456.polish.srt")
        );
    }

    #[tokio::test]
    async fn test_local_source_reads_manual_transcript() {
        let temp = assert_fs::TempDir::new().unwrap();
        let srt = temp.child("manual.srt");
        srt.write_str("1\n00:00:01,000 --> 00:00:02,500\nHello\n\n").unwrap();

        let identity = VideoIdentity::parse("dQw4w9WgXcQ").unwrap();
        let material = LocalSource::new(None)
            .with_manual_transcript(Some(srt.path().to_path_buf()))
            .acquire(&identity)
            .await
            .unwrap();

        assert_eq!(material.manual_transcript, Some(vec![Cue::new(1_000, 2_500, "Hello")]));
        assert!(material.audio.is_none());
    }

    #[tokio::test]
    async fn test_local_source_missing_file() {
        let identity = VideoIdentity::parse("dQw4w9WgXcQ").unwrap();
        let err = LocalSource::new(Some(PathBuf::from("/nonexistent/audio.wav")))
            .acquire(&identity)
            .await
            .unwrap_err();
        assert!(matches!(err, SubversesError::FileNotFound(_)));
    }
}
