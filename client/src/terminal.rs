//! Interactive participant for a human at a terminal

use crate::session::{FrameReader, FrameWriter, Incoming, SessionError};
use log::info;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite};

/// Typed line that leaves the chat
pub const EXIT_COMMAND: &str = "/exit";

/// Why a terminal session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalExit {
    /// The user typed `/exit` or closed their input
    UserQuit,
    Kicked(String),
    ServerClosed,
}

/// Relays typed lines to the chat and prints everything received
///
/// Each input line is sent as one chat message; empty lines are skipped.
pub async fn run_terminal<I, R, W, O>(
    input: I,
    mut reader: FrameReader<R>,
    mut writer: FrameWriter<W>,
    mut output: O,
) -> Result<TerminalExit, SessionError>
where
    I: AsyncBufRead + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    O: Write,
{
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim() == EXIT_COMMAND => {
                    writer.close().await?;
                    return Ok(TerminalExit::UserQuit);
                }
                Some(line) if line.trim().is_empty() => {}
                Some(line) => writer.send_chat(line.trim_end()).await?,
                None => {
                    writer.close().await?;
                    return Ok(TerminalExit::UserQuit);
                }
            },
            incoming = reader.next() => match incoming? {
                Incoming::Message(frame) => writeln!(output, "{}", frame)?,
                Incoming::Kicked(reason) => {
                    writeln!(output, "You were kicked by the host for {}.", reason)?;
                    info!("Kicked: {}", reason);
                    return Ok(TerminalExit::Kicked(reason));
                }
                Incoming::Closed => {
                    writeln!(output, "The server closed the connection.")?;
                    return Ok(TerminalExit::ServerClosed);
                }
            },
        }
    }
}
