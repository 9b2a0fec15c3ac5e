//! Server-side record of one accepted TCP peer
//!
//! A [`Connection`] owns everything the relay knows about a peer except the
//! socket itself: framing remainders in both directions, the FIFO of
//! messages still to be written, identity, rate accounting and lifecycle
//! state. Socket I/O goes through [`Connection::read_from`] and
//! [`Connection::flush_into`], which accept any `Read`/`Write` so the
//! buffering rules can be exercised without a network.

use crate::spam::RateCounter;
use chrono::{DateTime, Local};
use shared::FrameBuffer;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::time::Instant;

/// Identifier of a connection, also used as its readiness token
pub type ConnectionId = usize;

/// Lifecycle of a connection
///
/// `Connecting -> Active -> Draining -> Closed`, with `Connecting ->
/// Draining` for peers that never announce a valid identity. Transitions are
/// made only by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, identity frame not received yet
    Connecting,
    /// Identified and relaying
    Active { username: String },
    /// Removal has begun; no more reads, farewell output may be pending
    Draining {
        username: Option<String>,
        reason: Option<String>,
        since: Instant,
    },
    /// Socket closed and record discarded
    Closed,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Active { .. } => "active",
            ConnectionState::Draining { .. } => "draining",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Why a connection is being removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalCause {
    /// The peer closed its end; peers are told, nothing is sent back
    PeerClosed,
    /// An unrecoverable I/O error; nobody is told, the socket is dropped
    Broken,
    /// Server-initiated; the peer receives the reason before the close
    Kicked(String),
}

/// How a read pass ended
#[derive(Debug)]
pub enum ReadEnd {
    /// All available bytes were consumed
    WouldBlock,
    /// The peer closed the stream
    Closed,
    /// The socket failed
    Failed(io::Error),
    /// The read budget ran out; more input may be waiting
    BudgetSpent,
    /// A frame, complete or not, grew past the size limit
    FrameTooLong,
}

/// Bounds applied to one read pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// Longest frame accepted, delimiter excluded
    pub max_frame_len: usize,
    /// Bytes read from one connection before yielding to the others
    pub read_budget: usize,
}

/// Frames completed by one read pass and how the pass ended
#[derive(Debug)]
pub struct ReadOutcome {
    pub frames: Vec<String>,
    pub end: ReadEnd,
}

/// How a write pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue and remainder are empty
    Drained,
    /// The OS buffer is full; the unsent tail is kept for later
    Blocked,
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub last_activity: DateTime<Local>,
    pub(crate) rate: RateCounter,
    state: ConnectionState,
    frames: FrameBuffer,
    send_remainder: Vec<u8>,
    outbound: VecDeque<String>,
    broken: bool,
}

impl Connection {
    pub fn new(id: ConnectionId, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            last_activity: Local::now(),
            rate: RateCounter::new(),
            state: ConnectionState::Connecting,
            frames: FrameBuffer::new(),
            send_remainder: Vec::new(),
            outbound: VecDeque::new(),
            broken: false,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn username(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Active { username } => Some(username),
            ConnectionState::Draining { username, .. } => username.as_deref(),
            _ => None,
        }
    }

    pub fn kick_reason(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Draining { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn is_draining(&self) -> bool {
        matches!(self.state, ConnectionState::Draining { .. })
    }

    /// True while the connection should still receive relayed traffic
    pub fn accepts_traffic(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Active { .. }
        )
    }

    /// Flags the socket as unusable; returns false if it already was
    pub fn mark_broken(&mut self) -> bool {
        !std::mem::replace(&mut self.broken, true)
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn touch(&mut self) {
        self.last_activity = Local::now();
    }

    pub fn enqueue(&mut self, message: impl Into<String>) {
        self.outbound.push_back(message.into());
    }

    pub fn outbound(&self) -> impl Iterator<Item = &str> {
        self.outbound.iter().map(String::as_str)
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty() || !self.send_remainder.is_empty()
    }

    pub(crate) fn discard_output(&mut self) {
        self.outbound.clear();
        self.send_remainder.clear();
    }

    /// Reads until the socket would block or the budget is spent, decoding
    /// frames as they complete
    ///
    /// Edge-triggered readiness only reports new data once, so a pass that
    /// ends with [`ReadEnd::BudgetSpent`] must be resumed by the caller.
    /// Frames completed before a close or an error are still returned. When a
    /// frame exceeds `max_frame_len` the frames of that chunk are dropped.
    pub fn read_from<R: Read>(
        &mut self,
        reader: &mut R,
        scratch: &mut [u8],
        limits: ReadLimits,
    ) -> ReadOutcome {
        let mut frames = Vec::new();
        let mut consumed = 0;

        let end = loop {
            let want = scratch.len().min(limits.read_budget - consumed);
            if want == 0 {
                break ReadEnd::BudgetSpent;
            }
            match reader.read(&mut scratch[..want]) {
                Ok(0) => break ReadEnd::Closed,
                Ok(n) => {
                    consumed += n;
                    let completed = self.frames.push(&scratch[..n]);
                    if self.frames.pending().len() > limits.max_frame_len
                        || completed.iter().any(|f| f.len() > limits.max_frame_len)
                    {
                        break ReadEnd::FrameTooLong;
                    }
                    frames.extend(completed);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break ReadEnd::WouldBlock,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => break ReadEnd::Failed(e),
            }
        };

        ReadOutcome { frames, end }
    }

    /// Writes queued messages until the queue is empty or the socket is full
    ///
    /// A partially written frame is kept as the send remainder and finished
    /// before the next queued message is encoded.
    pub fn flush_into<W: Write>(&mut self, writer: &mut W) -> io::Result<FlushOutcome> {
        loop {
            if self.send_remainder.is_empty() {
                match self.outbound.pop_front() {
                    Some(message) => self.send_remainder = shared::encode(&message),
                    None => return Ok(FlushOutcome::Drained),
                }
            }

            match writer.write(&self.send_remainder) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.send_remainder.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(FlushOutcome::Blocked),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
