//! Media transports: one controllable output per loaded track.
//!
//! The playback engine never decodes anything itself.  It opens one
//! [`Transport`] per track through a [`TransportFactory`] and only issues
//! start / pause / resume / stop / volume commands, polling
//! [`Transport::is_active`] and [`Transport::elapsed`] from its tick.
//!
//! [`ProcessTransport`] drives an external player process (default `ffplay`).
//! Elapsed time is a wall clock that stops while paused, since the player
//! does not report its position.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::CommandSpec;

/// Which part of a prepared song a transport plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Instrumental,
    Vocals,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrackKind::Instrumental => "instrumental",
            TrackKind::Vocals => "vocals",
            TrackKind::Video => "video",
        })
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot start {kind} track: {message}")]
    Start { kind: TrackKind, message: String },

    #[error("transport control failed: {0}")]
    Control(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A single playing track.
///
/// Methods are synchronous and must return quickly; they are called from the
/// session loop.
pub trait Transport: Send {
    fn start(&mut self) -> Result<(), TransportError>;
    fn pause(&mut self) -> Result<(), TransportError>;
    fn resume(&mut self) -> Result<(), TransportError>;
    fn stop(&mut self);
    /// `true` while the track is playing or paused.
    fn is_active(&mut self) -> bool;
    /// Playback position.
    fn elapsed(&self) -> Duration;
    /// Volume in `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32) -> Result<(), TransportError>;
}

/// Opens transports for track files.
pub trait TransportFactory: Send + Sync {
    fn open(&self, path: &Path, kind: TrackKind) -> Result<Box<dyn Transport>, TransportError>;
}

// ---------------------------------------------------------------------------
// PlayClock
// ---------------------------------------------------------------------------

/// Wall clock that only advances while running.
#[derive(Debug, Default, Clone)]
struct PlayClock {
    banked: Duration,
    running_since: Option<Instant>,
}

impl PlayClock {
    fn elapsed(&self) -> Duration {
        self.banked + self.running_since.map(|t| t.elapsed()).unwrap_or_default()
    }

    fn run(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    fn halt(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.banked += since.elapsed();
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessTransport
// ---------------------------------------------------------------------------

/// [`Transport`] backed by an external player process.
///
/// Placeholders: `{input}`, `{volume}` (0–100), `{start}` (seconds to seek to).
/// A volume change restarts the player at the current position, because
/// command-line players take volume only at launch.
pub struct ProcessTransport {
    command: CommandSpec,
    path: PathBuf,
    kind: TrackKind,
    volume: f32,
    child: Option<Child>,
    clock: PlayClock,
    paused: bool,
    /// Relaunch instead of continuing the stopped process on resume.
    relaunch_on_resume: bool,
}

impl ProcessTransport {
    pub fn new(command: CommandSpec, path: PathBuf, kind: TrackKind) -> Self {
        Self {
            command,
            path,
            kind,
            volume: 1.0,
            child: None,
            clock: PlayClock::default(),
            paused: false,
            relaunch_on_resume: false,
        }
    }

    fn launch(&mut self) -> Result<(), TransportError> {
        let input = self.path.to_string_lossy().into_owned();
        let volume = format!("{}", (self.volume * 100.0).round() as u32);
        let start = format!("{:.2}", self.clock.elapsed().as_secs_f64());

        let child = self
            .command
            .spawn(&[("input", &input), ("volume", &volume), ("start", &start)])
            .map_err(|e| TransportError::Start {
                kind: self.kind,
                message: e.to_string(),
            })?;
        log::debug!("transport: {} player pid {}", self.kind, child.id());
        self.child = Some(child);
        Ok(())
    }

    fn kill_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    #[cfg(unix)]
    fn signal(&mut self, signal: libc::c_int) -> Result<(), TransportError> {
        let Some(child) = &self.child else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(child.id())
            .map_err(|e| TransportError::Control(format!("pid {}: {e}", child.id())))?;
        // SAFETY: `pid` belongs to a child we spawned and have not reaped yet.
        if unsafe { libc::kill(pid, signal) } == 0 {
            Ok(())
        } else {
            Err(TransportError::Control(format!(
                "signal {signal} to pid {pid}: {}",
                std::io::Error::last_os_error()
            )))
        }
    }
}

impl Transport for ProcessTransport {
    fn start(&mut self) -> Result<(), TransportError> {
        if self.child.is_some() {
            return Ok(());
        }
        self.launch()?;
        self.paused = false;
        self.clock.run();
        Ok(())
    }

    fn pause(&mut self) -> Result<(), TransportError> {
        if self.paused || self.child.is_none() {
            return Ok(());
        }

        #[cfg(unix)]
        self.signal(libc::SIGSTOP)?;
        #[cfg(not(unix))]
        {
            self.kill_child();
            self.relaunch_on_resume = true;
        }

        self.clock.halt();
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), TransportError> {
        if !self.paused {
            return Ok(());
        }

        if self.relaunch_on_resume {
            self.kill_child();
            self.launch()?;
            self.relaunch_on_resume = false;
        } else {
            #[cfg(unix)]
            self.signal(libc::SIGCONT)?;
        }

        self.clock.run();
        self.paused = false;
        Ok(())
    }

    fn stop(&mut self) {
        self.kill_child();
        self.clock.halt();
        self.paused = false;
        self.relaunch_on_resume = false;
    }

    fn is_active(&mut self) -> bool {
        if self.paused {
            return true;
        }
        let Some(child) = &mut self.child else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                log::debug!("transport: {} player exited with {status}", self.kind);
                self.child = None;
                self.clock.halt();
                false
            }
            Err(e) => {
                log::warn!("transport: cannot poll {} player: {e}", self.kind);
                self.child = None;
                self.clock.halt();
                false
            }
        }
    }

    fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), TransportError> {
        let volume = volume.clamp(0.0, 1.0);
        if (volume - self.volume).abs() < f32::EPSILON {
            return Ok(());
        }
        self.volume = volume;

        if self.child.is_none() {
            return Ok(());
        }
        if self.paused {
            self.relaunch_on_resume = true;
            return Ok(());
        }

        self.kill_child();
        self.launch()
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        self.kill_child();
    }
}

// ---------------------------------------------------------------------------
// ProcessTransportFactory
// ---------------------------------------------------------------------------

/// Opens [`ProcessTransport`]s, using one command for audio and one for video.
#[derive(Debug, Clone)]
pub struct ProcessTransportFactory {
    audio: CommandSpec,
    video: CommandSpec,
}

impl ProcessTransportFactory {
    pub fn new(audio: CommandSpec, video: CommandSpec) -> Self {
        Self { audio, video }
    }

    pub fn default_audio_command() -> CommandSpec {
        CommandSpec::new(
            "ffplay",
            &[
                "-nodisp",
                "-autoexit",
                "-loglevel",
                "quiet",
                "-ss",
                "{start}",
                "-volume",
                "{volume}",
                "{input}",
            ],
        )
    }

    pub fn default_video_command() -> CommandSpec {
        CommandSpec::new(
            "ffplay",
            &[
                "-autoexit",
                "-loglevel",
                "quiet",
                "-an",
                "-ss",
                "{start}",
                "{input}",
            ],
        )
    }
}

impl Default for ProcessTransportFactory {
    fn default() -> Self {
        Self::new(Self::default_audio_command(), Self::default_video_command())
    }
}

impl TransportFactory for ProcessTransportFactory {
    fn open(&self, path: &Path, kind: TrackKind) -> Result<Box<dyn Transport>, TransportError> {
        if !path.is_file() {
            return Err(TransportError::Start {
                kind,
                message: format!("{} does not exist", path.display()),
            });
        }
        let command = match kind {
            TrackKind::Video => self.video.clone(),
            TrackKind::Instrumental | TrackKind::Vocals => self.audio.clone(),
        };
        Ok(Box::new(ProcessTransport::new(
            command,
            path.to_path_buf(),
            kind,
        )))
    }
}
