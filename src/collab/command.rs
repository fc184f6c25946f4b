//! Configurable external command lines with `{placeholder}` substitution.
//!
//! Every command-line adapter in this module tree is driven by a
//! [`CommandSpec`] read from `settings.toml`, so users can swap `yt-dlp`,
//! `demucs`, `whisper` or `ffplay` for any tool with a compatible interface.

use std::process::Stdio;

use serde::{Deserialize, Serialize};

use super::ToolError;

/// Bytes of stderr kept in a [`ToolError::Exit`] message.
const STDERR_TAIL_BYTES: usize = 400;

/// Program plus argument template.
///
/// Arguments may contain `{name}` placeholders which are replaced by
/// [`render`](Self::render).  Unknown placeholders are left as-is.
///
/// ```
/// use karaoke_session::collab::CommandSpec;
///
/// let spec = CommandSpec::new("demucs", &["-o", "{output_dir}", "{input}"]);
/// let args = spec.render(&[("input", "/tmp/a.webm"), ("output_dir", "/tmp/out")]);
/// assert_eq!(args, vec!["-o", "/tmp/out", "/tmp/a.webm"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Substitute `{name}` placeholders in every argument.
    pub fn render(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{name}}}"), value)
                })
            })
            .collect()
    }

    /// Run the command to completion and return its stdout.
    ///
    /// A non-zero exit status becomes [`ToolError::Exit`] carrying the tail of
    /// stderr.
    pub async fn run(&self, vars: &[(&str, &str)]) -> Result<String, ToolError> {
        let args = self.render(vars);
        log::debug!("tool: running {} {:?}", self.program, args);

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::Exit {
                program: self.program.clone(),
                status: output.status,
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Spawn the command without waiting, with all stdio detached.
    pub fn spawn(&self, vars: &[(&str, &str)]) -> Result<std::process::Child, ToolError> {
        let args = self.render(vars);
        log::debug!("tool: spawning {} {:?}", self.program, args);

        std::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}
