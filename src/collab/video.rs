//! Optional video download (default: `yt-dlp -f mp4`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::cache::VIDEO_FILE;

use super::{CommandSpec, ToolError, VideoFetcher};

/// [`VideoFetcher`] that runs a configurable command.
///
/// Placeholders: `{source}`, `{output}` (full path of `video.mp4`).
#[derive(Debug, Clone)]
pub struct CommandVideoFetcher {
    command: CommandSpec,
}

impl CommandVideoFetcher {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }

    pub fn default_command() -> CommandSpec {
        CommandSpec::new(
            "yt-dlp",
            &["-f", "mp4", "--no-playlist", "--quiet", "-o", "{output}", "{source}"],
        )
    }
}

impl Default for CommandVideoFetcher {
    fn default() -> Self {
        Self::new(Self::default_command())
    }
}

#[async_trait]
impl VideoFetcher for CommandVideoFetcher {
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, ToolError> {
        let output = dest_dir.join(VIDEO_FILE);
        if output.is_file() {
            log::info!("video: already have {}", output.display());
            return Ok(output);
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let output_str = output.to_string_lossy();
        self.command
            .run(&[("source", source), ("output", &output_str)])
            .await?;

        if output.is_file() {
            Ok(output)
        } else {
            Err(ToolError::MissingOutput(output))
        }
    }
}
