//! Raw audio download through an external command (default: `yt-dlp`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{CommandSpec, Downloader, ToolError};

/// File stem the download command is told to write to.
pub const RAW_STEM: &str = "source";

/// Extensions left behind by interrupted downloads.
const PARTIAL_EXTENSIONS: &[&str] = &["part", "ytdl", "tmp"];

/// [`Downloader`] that runs a configurable command.
///
/// Placeholders: `{source}`, `{output_dir}`.  The command must write a single
/// file named `source.<ext>` into `{output_dir}`.
#[derive(Debug, Clone)]
pub struct CommandDownloader {
    command: CommandSpec,
}

impl CommandDownloader {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }

    pub fn default_command() -> CommandSpec {
        CommandSpec::new(
            "yt-dlp",
            &[
                "-f",
                "bestaudio/best",
                "--no-playlist",
                "--quiet",
                "-o",
                "{output_dir}/source.%(ext)s",
                "{source}",
            ],
        )
    }
}

impl Default for CommandDownloader {
    fn default() -> Self {
        Self::new(Self::default_command())
    }
}

#[async_trait]
impl Downloader for CommandDownloader {
    async fn download(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, ToolError> {
        tokio::fs::create_dir_all(dest_dir).await?;

        if let Some(existing) = find_raw_media(dest_dir)? {
            log::info!("download: reusing {}", existing.display());
            return Ok(existing);
        }

        let output_dir = dest_dir.to_string_lossy();
        self.command
            .run(&[("source", source), ("output_dir", &output_dir)])
            .await?;

        find_raw_media(dest_dir)?.ok_or_else(|| ToolError::MissingOutput(dest_dir.join(RAW_STEM)))
    }
}

/// Locate a completed `source.<ext>` file in `dir`.
pub fn find_raw_media(dir: &Path) -> Result<Option<PathBuf>, ToolError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.file_stem().is_some_and(|s| s == RAW_STEM))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| !PARTIAL_EXTENSIONS.contains(&ext))
        })
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}
