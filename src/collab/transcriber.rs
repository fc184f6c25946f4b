//! Lyric transcription through an external command (default: `whisper`).
//!
//! The tool is asked for JSON output and the `segments` array is turned into
//! a [`LyricTimeline`]:
//!
//! ```text
//! { "segments": [ { "start": 12.3, "end": 15.0, "text": " Hello" }, ... ] }
//! ```

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::song::{LyricLine, LyricTimeline};

use super::{CommandSpec, ToolError, Transcriber};

#[derive(Debug, Deserialize)]
struct Transcript {
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    start: f64,
    #[serde(default)]
    text: String,
}

/// [`Transcriber`] that runs a configurable command.
///
/// Placeholders: `{input}`, `{output_dir}`.  The command must write
/// `<output_dir>/<input stem>.json`; `{output_dir}` is the vocal track's
/// directory.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    command: CommandSpec,
}

impl CommandTranscriber {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }

    pub fn default_command() -> CommandSpec {
        CommandSpec::new(
            "whisper",
            &[
                "{input}",
                "--output_format",
                "json",
                "--output_dir",
                "{output_dir}",
            ],
        )
    }
}

impl Default for CommandTranscriber {
    fn default() -> Self {
        Self::new(Self::default_command())
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, vocals: &Path) -> Result<LyricTimeline, ToolError> {
        let output_dir = vocals.parent().unwrap_or_else(|| Path::new("."));
        let input = vocals.to_string_lossy();
        let output_dir_str = output_dir.to_string_lossy();
        self.command
            .run(&[("input", &input), ("output_dir", &output_dir_str)])
            .await?;

        let stem = vocals.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = output_dir.join(format!("{stem}.json"));
        let json = match tokio::fs::read_to_string(&json_path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::MissingOutput(json_path))
            }
            Err(e) => return Err(e.into()),
        };

        let timeline = parse_segments(&json)?;
        log::info!(
            "transcribe: {} line(s) from {}",
            timeline.len(),
            vocals.display()
        );
        Ok(timeline)
    }
}

/// Parse a JSON transcript into a timeline, skipping segments without text.
pub fn parse_segments(json: &str) -> Result<LyricTimeline, ToolError> {
    let transcript: Transcript =
        serde_json::from_str(json).map_err(|e| ToolError::Parse(e.to_string()))?;

    let lines = transcript
        .segments
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| LyricLine::new(s.start, s.text.trim()))
        .collect();
    Ok(LyricTimeline::new(lines))
}
