use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, SubversesError};

/// One displayed subtitle line. Times are milliseconds on the cue's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl Cue {
    pub fn new<S: Into<String>>(start_ms: u64, end_ms: u64, text: S) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Same cue moved later by `offset_ms`
    pub fn shifted(&self, offset_ms: u64) -> Self {
        Self {
            start_ms: self.start_ms + offset_ms,
            end_ms: self.end_ms + offset_ms,
            text: self.text.clone(),
        }
    }
}

/// Ordered cues spanning a whole video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub cues: Vec<Cue>,
    /// Language of the cue text: ISO code for sources, name for translations
    pub language: String,
}

impl Transcript {
    pub fn new<S: Into<String>>(cues: Vec<Cue>, language: S) -> Self {
        Self {
            cues,
            language: language.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }
}

/// Write cues as an SRT file. The file only appears once it is complete.
pub async fn write_srt<P: AsRef<Path>>(cues: &[Cue], output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating SRT file: {}", output_path.display());

    let content = render_srt(cues)?;
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(output_path);
    fs::write(&partial, content).await?;
    if let Err(e) = fs::rename(&partial, output_path).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }

    info!("SRT file generated successfully ({} cues)", cues.len());
    Ok(())
}

/// Hidden sibling of `path` that a write goes to before it is renamed into place
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4().simple()))
}

/// Render cues in SubRip block form, numbering from 1
pub fn render_srt(cues: &[Cue]) -> Result<String> {
    let mut srt_content = String::new();

    for (index, cue) in cues.iter().enumerate() {
        if cue.end_ms <= cue.start_ms {
            return Err(SubversesError::Invariant(format!(
                "cue {} ends at {} ms but starts at {} ms",
                index + 1,
                cue.end_ms,
                cue.start_ms
            )));
        }

        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(cue.start_ms),
            format_srt_time(cue.end_ms),
            normalize_text(&cue.text)
        ));
    }

    Ok(srt_content)
}

/// Read an SRT file into cues
pub async fn read_srt<P: AsRef<Path>>(path: P) -> Result<Vec<Cue>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| SubversesError::Subtitle(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_srt(&content)
}

/// Parse SubRip text. Block numbers are ignored; order is file order.
pub fn parse_srt(content: &str) -> Result<Vec<Cue>> {
    let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in content.split("\n\n") {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            continue;
        }

        let timing_pos = lines
            .iter()
            .position(|l| l.contains("-->"))
            .ok_or_else(|| SubversesError::Subtitle(format!("Invalid block \"{}\"", block.trim())))?;

        let (start, end) = lines[timing_pos]
            .split_once("-->")
            .ok_or_else(|| SubversesError::Subtitle(format!("Invalid timing line \"{}\"", lines[timing_pos])))?;

        cues.push(Cue {
            start_ms: parse_srt_time(start)?,
            // Trailing position hints such as "X1:..." are not timing data
            end_ms: parse_srt_time(end.split_whitespace().next().unwrap_or_default())?,
            text: lines[timing_pos + 1..].join("\n"),
        });
    }

    Ok(cues)
}

/// Format milliseconds to SRT time format (HH:MM:SS,mmm)
pub fn format_srt_time(total_milliseconds: u64) -> String {
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Parse HH:MM:SS,mmm (a '.' separator is accepted too)
pub fn parse_srt_time(value: &str) -> Result<u64> {
    let invalid = || SubversesError::Subtitle(format!("Invalid timestamp \"{}\"", value.trim()));

    let value = value.trim().replace('.', ",");
    let (clock, millis) = value.split_once(',').unwrap_or((value.as_str(), "0"));
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let hours: u64 = parts[0].trim().parse().map_err(|_| invalid())?;
    let minutes: u64 = parts[1].trim().parse().map_err(|_| invalid())?;
    let secs: u64 = parts[2].trim().parse().map_err(|_| invalid())?;
    let millis: u64 = millis.trim().parse().map_err(|_| invalid())?;
    if minutes >= 60 || secs >= 60 || millis >= 1000 {
        return Err(invalid());
    }

    Ok(hours * 3_600_000 + minutes * 60_000 + secs * 1_000 + millis)
}

/// Greedy word wrap; existing line breaks are treated as spaces
pub fn word_wrap(text: &str, line_length: usize) -> String {
    if line_length == 0 {
        return text.trim().to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > line_length {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n")
}

// Blank lines inside a cue would end the SRT block early
fn normalize_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
