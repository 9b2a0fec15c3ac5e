//! Hand-off of administrative work to the multiplexer thread
//!
//! The console and the host generator run on their own threads and never
//! touch connection records. They post a [`Command`] on a channel and wake
//! the readiness loop, which applies the command at the start of its next
//! iteration. Requests that need an answer carry a one-shot reply channel.

use crate::connection_manager::ConnectionInfo;
use crate::error::ServerError;
use mio::Waker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

/// Reason given to participants when the server stops without one
pub const DEFAULT_SHUTDOWN_REASON: &str = "the server is shutting down";

/// Reason given to a kicked participant when the operator omits one
pub const DEFAULT_KICK_REASON: &str = "no reason given";

/// Work queued for the multiplexer thread
#[derive(Debug)]
pub enum Command {
    /// Deliver `Host: <prompt>` to every connection
    HostPrompt(String),
    /// Remove the participant with this display name
    Kick {
        username: String,
        reason: String,
        reply: Sender<bool>,
    },
    /// Report every connection
    List { reply: Sender<Vec<ConnectionInfo>> },
    /// Kick everyone, stop accepting, then stop the loop
    Shutdown { reason: String, done: Sender<()> },
}

/// Cloneable handle used by other threads to drive a running server
#[derive(Clone)]
pub struct ControlHandle {
    commands: Sender<Command>,
    waker: Arc<Waker>,
    stop: Arc<AtomicBool>,
}

impl ControlHandle {
    pub(crate) fn new(commands: Sender<Command>, waker: Arc<Waker>) -> Self {
        Self {
            commands,
            waker,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn send(&self, command: Command) -> Result<(), ServerError> {
        if self.is_stopped() {
            return Err(ServerError::Stopped);
        }
        self.commands
            .send(command)
            .map_err(|_| ServerError::Stopped)?;
        self.waker.wake()?;
        Ok(())
    }

    /// Queues a host prompt for broadcast
    pub fn announce(&self, prompt: impl Into<String>) -> Result<(), ServerError> {
        self.send(Command::HostPrompt(prompt.into()))
    }

    /// Kicks the participant named `username`
    ///
    /// Returns false when no active participant has that name.
    pub fn kick(&self, username: &str, reason: &str) -> Result<bool, ServerError> {
        let (reply, answer) = mpsc::channel();
        self.send(Command::Kick {
            username: username.to_string(),
            reason: reason.to_string(),
            reply,
        })?;
        answer.recv().map_err(|_| ServerError::Stopped)
    }

    pub fn list_connections(&self) -> Result<Vec<ConnectionInfo>, ServerError> {
        let (reply, answer) = mpsc::channel();
        self.send(Command::List { reply })?;
        answer.recv().map_err(|_| ServerError::Stopped)
    }

    /// Starts a graceful shutdown and blocks until every connection is closed
    pub fn shutdown(&self, reason: &str) -> Result<(), ServerError> {
        let (done, finished) = mpsc::channel();
        self.send(Command::Shutdown {
            reason: reason.to_string(),
            done,
        })?;
        finished.recv().map_err(|_| ServerError::Stopped)
    }

    /// Raises the stop flag and wakes the loop
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            log::debug!("Failed to wake the server loop: {}", e);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}
