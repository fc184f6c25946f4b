//! Line-oriented TCP remote control.
//!
//! ```text
//! client ──"skip\n"──▶ connection task ──parse_command──▶ execute(SessionHandle)
//!        ◀──"{\"ok\":true}\n"──┘
//! ```
//!
//! Every connection gets its own task.  Songs enqueued without an explicit
//! submitter are attributed to the peer's IP address, so each phone on the
//! network counts as its own submitter for rotation.
//!
//! Lines longer than [`MAX_LINE_BYTES`] are answered with an error and
//! discarded up to the next newline.

pub mod protocol;

use std::net::SocketAddr;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::session::SessionHandle;

pub use protocol::{execute, parse_command, parse_error_reply, ControlCommand, ParseError};

/// Longest accepted command line, excluding the newline.
pub const MAX_LINE_BYTES: usize = 4096;

/// Accept connections until the listener fails.
pub async fn serve(listener: TcpListener, session: SessionHandle) {
    if let Ok(addr) = listener.local_addr() {
        log::info!("remote: listening on {addr}");
    }
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let session = session.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, session).await {
                        log::warn!("remote: connection {peer} failed: {e}");
                    }
                });
            }
            Err(e) => {
                log::error!("remote: accept failed: {e}");
                return;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    session: SessionHandle,
) -> std::io::Result<()> {
    log::info!("remote: {peer} connected");
    let submitter = peer.ip().to_string();
    let (reader, mut writer) = stream.into_split();
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                log::warn!("remote: {peer} sent a line over {MAX_LINE_BYTES} bytes");
                let reply = serde_json::json!({
                    "ok": false,
                    "error": format!("line too long (limit {MAX_LINE_BYTES} bytes)"),
                });
                write_reply(&mut writer, &reply).await?;
                continue;
            }
            Err(LinesCodecError::Io(e)) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = match parse_command(&line, &submitter) {
            Ok(ControlCommand::Quit) => {
                write_reply(&mut writer, &serde_json::json!({ "ok": true })).await?;
                break;
            }
            Ok(command) => execute(&session, command).await,
            Err(e) => parse_error_reply(&e),
        };
        write_reply(&mut writer, &reply).await?;
    }

    log::info!("remote: {peer} disconnected");
    Ok(())
}

async fn write_reply<W: AsyncWrite + Unpin>(
    writer: &mut W,
    reply: &serde_json::Value,
) -> std::io::Result<()> {
    let mut line = reply.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
