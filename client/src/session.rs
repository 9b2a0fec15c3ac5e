//! Client side of the chat protocol
//!
//! A session is a TCP stream split into a [`FrameReader`] and a
//! [`FrameWriter`]. Both halves are generic over tokio's async I/O traits so
//! they run unchanged against in-memory mocks.

use log::{debug, info};
use shared::FrameBuffer;
use std::collections::VecDeque;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unable to connect to the chat server at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid username: {0}")]
    Identity(#[from] shared::IdentityError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// One event from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Any frame other than a kick notice
    Message(String),
    /// The server removed this participant for the given reason
    Kicked(String),
    /// The server closed the connection
    Closed,
}

/// Receiving half of a session
pub struct FrameReader<R> {
    inner: R,
    frames: FrameBuffer,
    ready: VecDeque<String>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            frames: FrameBuffer::new(),
            ready: VecDeque::new(),
            buf: vec![0u8; READ_CHUNK],
        }
    }

    /// Waits for the next frame
    ///
    /// Cancel safe: a frame decoded before cancellation is kept for the
    /// next call.
    pub async fn next(&mut self) -> Result<Incoming, SessionError> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(match shared::parse_kick_notice(&frame) {
                    Some(reason) => Incoming::Kicked(reason.to_string()),
                    None => Incoming::Message(frame),
                });
            }

            let n = self.inner.read(&mut self.buf).await?;
            if n == 0 {
                if self.frames.has_partial_frame() {
                    debug!(
                        "Discarding {} bytes of an unfinished frame",
                        self.frames.pending().len()
                    );
                }
                return Ok(Incoming::Closed);
            }
            self.ready.extend(self.frames.push(&self.buf[..n]));
        }
    }
}

/// Sending half of a session
pub struct FrameWriter<W> {
    inner: W,
    username: String,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Validates `username` the way the server will
    pub fn new(inner: W, username: &str) -> Result<Self, SessionError> {
        Ok(Self {
            inner,
            username: shared::parse_identity(username)?,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Sends the identity frame that must open every session
    pub async fn announce(&mut self) -> Result<(), SessionError> {
        let username = self.username.clone();
        self.send_frame(&username).await
    }

    /// Sends `text` as `<username>: <text>`
    pub async fn send_chat(&mut self, text: &str) -> Result<(), SessionError> {
        let line = shared::chat_line(&self.username, text);
        self.send_frame(&line).await
    }

    async fn send_frame(&mut self, frame: &str) -> Result<(), SessionError> {
        self.inner.write_all(&shared::encode(frame)).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Closes the write direction so the server sees end of stream
    pub async fn close(&mut self) -> Result<(), SessionError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Connects to `addr` and announces `username`
pub async fn connect(
    addr: &str,
    username: &str,
) -> Result<(FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>), SessionError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| SessionError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    let (read_half, write_half) = stream.into_split();

    let mut writer = FrameWriter::new(write_half, username)?;
    writer.announce().await?;
    info!("Connected to {} as {}", addr, writer.username());

    Ok((FrameReader::new(read_half), writer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_reader_splits_frames_across_reads() {
        let mock = Builder::new()
            .read(b"User Alice has joined the chat!::EOMsg::Alice: he")
            .read(b"llo::EOMsg::")
            .build();
        let mut reader = FrameReader::new(mock);

        assert_eq!(
            reader.next().await.unwrap(),
            Incoming::Message("User Alice has joined the chat!".into())
        );
        assert_eq!(
            reader.next().await.unwrap(),
            Incoming::Message("Alice: hello".into())
        );
        assert_eq!(reader.next().await.unwrap(), Incoming::Closed);
    }

    #[tokio::test]
    async fn test_reader_reports_kick() {
        let mock = Builder::new()
            .read(b"Kicked by the host for rude behavior::EOMsg::")
            .build();
        let mut reader = FrameReader::new(mock);

        assert_eq!(
            reader.next().await.unwrap(),
            Incoming::Kicked("rude behavior".into())
        );
    }

    #[tokio::test]
    async fn test_writer_announces_then_prefixes() {
        let mock = Builder::new()
            .write(b"Bob::EOMsg::")
            .write(b"Bob: Hello::EOMsg::")
            .build();
        let mut writer = FrameWriter::new(mock, "Bob").unwrap();

        writer.announce().await.unwrap();
        writer.send_chat("Hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_rejects_invalid_username() {
        let mock = Builder::new().build();
        assert!(matches!(
            FrameWriter::new(mock, "Host"),
            Err(SessionError::Identity(_))
        ));
    }
}
