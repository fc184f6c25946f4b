//! Vocal separation through an external command (default: `demucs`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::cache::{INSTRUMENTAL_FILE, VOCALS_FILE};

use super::{CommandSpec, SeparatedTracks, Separator, ToolError};

/// Stem names written by a two-stem `demucs` run.
const TOOL_INSTRUMENTAL: &str = "no_vocals.wav";
const TOOL_VOCALS: &str = "vocals.wav";

/// [`Separator`] that runs a configurable command.
///
/// Placeholders: `{input}`, `{output_dir}`, `{model}`.  The command must write
/// `<output_dir>/<model>/<input stem>/{no_vocals,vocals}.wav`, which are then
/// moved to `instrumental.wav` / `vocals.wav` in the destination directory.
#[derive(Debug, Clone)]
pub struct CommandSeparator {
    command: CommandSpec,
    model: String,
}

impl CommandSeparator {
    pub fn new(command: CommandSpec, model: impl Into<String>) -> Self {
        Self {
            command,
            model: model.into(),
        }
    }

    pub fn default_command() -> CommandSpec {
        CommandSpec::new(
            "demucs",
            &["--two-stems", "vocals", "-n", "{model}", "-o", "{output_dir}", "{input}"],
        )
    }

    pub fn default_model() -> &'static str {
        "htdemucs"
    }

    /// Directory the tool writes stems into for `raw_audio`.
    fn stem_dir(&self, raw_audio: &Path, dest_dir: &Path) -> PathBuf {
        let stem = raw_audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        dest_dir.join(&self.model).join(stem)
    }
}

impl Default for CommandSeparator {
    fn default() -> Self {
        Self::new(Self::default_command(), Self::default_model())
    }
}

#[async_trait]
impl Separator for CommandSeparator {
    async fn separate(
        &self,
        raw_audio: &Path,
        dest_dir: &Path,
    ) -> Result<SeparatedTracks, ToolError> {
        let tracks = SeparatedTracks {
            instrumental: dest_dir.join(INSTRUMENTAL_FILE),
            vocals: dest_dir.join(VOCALS_FILE),
        };
        if tracks.instrumental.is_file() && tracks.vocals.is_file() {
            log::info!("separate: reusing stems in {}", dest_dir.display());
            return Ok(tracks);
        }

        let input = raw_audio.to_string_lossy();
        let output_dir = dest_dir.to_string_lossy();
        self.command
            .run(&[
                ("input", &input),
                ("output_dir", &output_dir),
                ("model", &self.model),
            ])
            .await?;

        let stem_dir = self.stem_dir(raw_audio, dest_dir);
        move_output(&stem_dir.join(TOOL_INSTRUMENTAL), &tracks.instrumental).await?;
        move_output(&stem_dir.join(TOOL_VOCALS), &tracks.vocals).await?;

        if let Err(e) = tokio::fs::remove_dir_all(dest_dir.join(&self.model)).await {
            log::debug!("separate: could not tidy {}: {e}", stem_dir.display());
        }
        Ok(tracks)
    }
}

async fn move_output(from: &Path, to: &Path) -> Result<(), ToolError> {
    if !from.is_file() {
        return Err(ToolError::MissingOutput(from.to_path_buf()));
    }
    tokio::fs::rename(from, to).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn existing_stems_skip_the_command() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(INSTRUMENTAL_FILE), b"i").unwrap();
        std::fs::write(dir.path().join(VOCALS_FILE), b"v").unwrap();

        let sep = CommandSeparator::new(CommandSpec::new("no-such-separator-1234", &[]), "m");
        let tracks = sep
            .separate(&dir.path().join("source.webm"), dir.path())
            .await
            .unwrap();
        assert_eq!(tracks.instrumental, dir.path().join(INSTRUMENTAL_FILE));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stems_are_moved_into_place() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("source.webm");
        std::fs::write(&raw, b"raw").unwrap();

        let script = "d='{output_dir}/{model}/source'; mkdir -p \"$d\" && \
                      echo i > \"$d/no_vocals.wav\" && echo v > \"$d/vocals.wav\"";
        let sep = CommandSeparator::new(CommandSpec::new("sh", &["-c", script]), "htdemucs");

        let tracks = sep.separate(&raw, dir.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&tracks.instrumental).unwrap(), "i\n");
        assert_eq!(std::fs::read_to_string(&tracks.vocals).unwrap(), "v\n");
        assert!(!dir.path().join("htdemucs").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_stem_is_reported() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("source.webm");
        std::fs::write(&raw, b"raw").unwrap();

        let sep = CommandSeparator::new(CommandSpec::new("true", &[]), "htdemucs");
        let err = sep.separate(&raw, dir.path()).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingOutput(p) if p.ends_with("no_vocals.wav")));
    }
}
