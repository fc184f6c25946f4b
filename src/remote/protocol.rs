//! Text command language shared by the console and the TCP remote.
//!
//! One command per line, one JSON reply per command:
//!
//! ```text
//! enqueue Queen | Under Pressure | https://… [| alice]   → {"ok":true}
//! remove 2                                              → {"ok":true}
//! state                                                 → {"ok":true,"state":{…}}
//! search waterloo                                       → {"ok":true,"results":[…]}
//! cached                                                → {"ok":true,"cached":[…]}
//! promote 9                                             → {"ok":false,"error":"…"}
//! ```
//!
//! Positions are 1-based here and 0-based everywhere else.

use serde_json::{json, Value};
use thiserror::Error;

use crate::session::{SessionError, SessionHandle};
use crate::song::SongRequest;

const ENQUEUE_USAGE: &str = "enqueue <artist> | <title> | <source> [| <submitter>]";
const POSITION_USAGE: &str = "expected a queue position starting at 1";
const VOCALS_USAGE: &str = "vocals on|off";
const SEARCH_USAGE: &str = "search <query>";

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Enqueue(SongRequest),
    /// 0-based.
    Remove(usize),
    /// 0-based.
    Promote(usize),
    Play,
    Pause,
    Resume,
    Skip,
    Vocals(bool),
    State,
    Search(String),
    /// List songs already prepared in the cache.
    Cached,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parse one line.  `default_submitter` is used when `enqueue` names none.
pub fn parse_command(line: &str, default_submitter: &str) -> Result<ControlCommand, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_lowercase().as_str() {
        "enqueue" | "add" => parse_enqueue(rest, default_submitter),
        "remove" | "rm" => parse_position(rest).map(ControlCommand::Remove),
        "promote" => parse_position(rest).map(ControlCommand::Promote),
        "play" => Ok(ControlCommand::Play),
        "pause" => Ok(ControlCommand::Pause),
        "resume" => Ok(ControlCommand::Resume),
        "skip" | "next" => Ok(ControlCommand::Skip),
        "vocals" => match rest.to_ascii_lowercase().as_str() {
            "on" => Ok(ControlCommand::Vocals(true)),
            "off" => Ok(ControlCommand::Vocals(false)),
            _ => Err(ParseError::Usage(VOCALS_USAGE)),
        },
        "state" | "status" => Ok(ControlCommand::State),
        "search" if !rest.is_empty() => Ok(ControlCommand::Search(rest.to_string())),
        "search" => Err(ParseError::Usage(SEARCH_USAGE)),
        "cached" => Ok(ControlCommand::Cached),
        "quit" | "exit" => Ok(ControlCommand::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

fn parse_enqueue(rest: &str, default_submitter: &str) -> Result<ControlCommand, ParseError> {
    let fields: Vec<&str> = rest.split('|').map(str::trim).collect();
    let (artist, title, source, submitter) = match fields.as_slice() {
        [artist, title, source] => (*artist, *title, *source, default_submitter),
        [artist, title, source, submitter] if !submitter.is_empty() => {
            (*artist, *title, *source, *submitter)
        }
        _ => return Err(ParseError::Usage(ENQUEUE_USAGE)),
    };
    if title.is_empty() || source.is_empty() {
        return Err(ParseError::Usage(ENQUEUE_USAGE));
    }
    Ok(ControlCommand::Enqueue(SongRequest::new(
        artist, title, source, submitter,
    )))
}

fn parse_position(rest: &str) -> Result<usize, ParseError> {
    match rest.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(ParseError::Usage(POSITION_USAGE)),
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run `command` against the session and build the JSON reply.
///
/// `Quit` only acknowledges; closing the connection is up to the caller.
pub async fn execute(session: &SessionHandle, command: ControlCommand) -> Value {
    let result = match command {
        ControlCommand::Enqueue(request) => session.enqueue(request).await,
        ControlCommand::Remove(position) => session.remove(position).await,
        ControlCommand::Promote(position) => session.promote(position).await,
        ControlCommand::Play => session.play().await,
        ControlCommand::Pause => session.pause().await,
        ControlCommand::Resume => session.resume().await,
        ControlCommand::Skip => session.skip().await,
        ControlCommand::Vocals(enabled) => session.set_vocals(enabled).await,
        ControlCommand::State => {
            return json!({ "ok": true, "state": session.state() });
        }
        ControlCommand::Search(query) => {
            return match session.search(&query).await {
                Ok(results) => json!({ "ok": true, "results": results }),
                Err(e) => error_reply(&e),
            };
        }
        ControlCommand::Cached => {
            return match session.cached().await {
                Ok(records) => json!({ "ok": true, "cached": records }),
                Err(e) => error_reply(&e),
            };
        }
        ControlCommand::Quit => Ok(()),
    };
    match result {
        Ok(()) => json!({ "ok": true }),
        Err(e) => error_reply(&e),
    }
}

/// Reply for a line that did not parse.
pub fn parse_error_reply(error: &ParseError) -> Value {
    json!({ "ok": false, "error": error.to_string() })
}

fn error_reply(error: &SessionError) -> Value {
    // Report positions back in the 1-based numbering the client used.
    let message = match error {
        SessionError::InvalidPosition { position, len } => {
            format!("no entry at position {} (queue has {len})", position + 1)
        }
        other => other.to_string(),
    };
    json!({ "ok": false, "error": message })
}
