//! Server network layer: the readiness multiplexer and its socket plumbing
//!
//! One thread owns the listener, every accepted stream and the
//! [`ConnectionManager`]. Each loop iteration runs these phases in order:
//!
//! 1. apply commands posted through the [`ControlHandle`]
//! 2. wait for readiness, bounded by the poll timeout
//! 3. accept pending connections
//! 4. read from readable sockets and relay completed frames
//! 5. write queued output
//! 6. tear down sockets that closed or failed
//! 7. begin the removals scheduled by relay or the console
//! 8. close draining connections whose farewell is out
//! 9. finish a requested shutdown once nothing is left
//! 10. rebuild write interest from the outbound queues

use crate::config::ServerConfig;
use crate::connection::{
    Connection, ConnectionId, ReadEnd, ReadLimits, ReadOutcome, RemovalCause,
};
use crate::connection_manager::ConnectionManager;
use crate::control::{Command, ControlHandle, DEFAULT_SHUTDOWN_REASON};
use crate::error::ServerError;
use crate::lifecycle::RemovalProgress;
use crate::relay::FRAME_TOO_LONG_REASON;
use crate::spam::SpamPolicy;
use log::{debug, error, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::collections::{HashMap, HashSet};
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);

/// Connection ids double as readiness tokens and start clear of the fixed ones
const FIRST_CONNECTION_ID: ConnectionId = 1000;

const EVENT_CAPACITY: usize = 1024;
const READ_CHUNK: usize = 4096;

/// The chat relay server
pub struct Server {
    config: ServerConfig,
    poll: Poll,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    streams: HashMap<ConnectionId, TcpStream>,
    /// Registrations that differ from plain READABLE
    interest: HashMap<ConnectionId, Interest>,
    /// Connections whose last read stopped at the budget
    unfinished_reads: HashSet<ConnectionId>,
    manager: ConnectionManager,
    commands: Receiver<Command>,
    handle: ControlHandle,
    shutting_down: bool,
    shutdown_waiters: Vec<Sender<()>>,
}

impl Server {
    /// Binds the listening socket and prepares the readiness loop
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        let (commands_tx, commands) = mpsc::channel();
        let handle = ControlHandle::new(commands_tx, waker);

        let manager = ConnectionManager::new(
            SpamPolicy {
                window: config.spam_window,
                ceiling: config.spam_ceiling,
            },
            FIRST_CONNECTION_ID,
        );

        info!("Chat relay listening on {}", local_addr);

        Ok(Server {
            config,
            poll,
            listener: Some(listener),
            local_addr,
            streams: HashMap::new(),
            interest: HashMap::new(),
            unfinished_reads: HashSet::new(),
            manager,
            commands,
            handle,
            shutting_down: false,
            shutdown_waiters: Vec::new(),
        })
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn control_handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Runs the readiness loop until shutdown completes or the stop flag is
    /// raised and every connection is gone
    ///
    /// Only a failing readiness wait is fatal: it raises the stop flag and is
    /// returned. Per-connection errors tear down that connection and the loop
    /// carries on.
    pub fn run(&mut self) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        let mut scratch = vec![0u8; READ_CHUNK];
        let limits = self.config.read_limits();

        loop {
            self.process_commands();
            if self.handle.is_stopped() && !self.shutting_down {
                self.begin_shutdown(DEFAULT_SHUTDOWN_REASON);
            }

            // Leftover input will not be reported again, so do not wait for it
            let timeout = if self.unfinished_reads.is_empty() {
                self.config.poll_timeout
            } else {
                Duration::ZERO
            };
            if let Err(e) = self.poll.poll(&mut events, Some(timeout)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(self.abort(e));
            }

            let mut accept = false;
            let mut readable: Vec<ConnectionId> = self.unfinished_reads.drain().collect();
            for event in events.iter() {
                match event.token() {
                    LISTENER => accept = true,
                    WAKER => {}
                    Token(id) => {
                        let ready =
                            event.is_readable() || event.is_read_closed() || event.is_error();
                        if ready && !readable.contains(&id) {
                            readable.push(id);
                        }
                    }
                }
            }

            let now = Instant::now();
            if accept {
                self.accept_connections(now);
            }

            let mut teardown = Vec::new();
            for id in readable {
                if let Some(cause) = self.receive(id, now, &mut scratch, limits) {
                    teardown.push((id, cause));
                }
            }

            for id in self.send_pending() {
                teardown.push((id, RemovalCause::Broken));
            }

            for (id, cause) in teardown {
                self.remove(id, cause, now);
            }

            for (id, cause) in self.manager.take_scheduled_removals() {
                self.remove(id, cause, now);
            }

            for id in self.manager.drained(now, self.config.drain_timeout) {
                self.close(id);
            }

            if self.shutting_down && self.manager.is_empty() {
                self.finish_shutdown();
                return Ok(());
            }

            self.rebuild_interest();
        }
    }

    /// Handles a failed readiness wait
    fn abort(&mut self, e: io::Error) -> ServerError {
        error!("Readiness wait failed: {}", e);
        self.handle.stop();
        ServerError::Poll(e)
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::HostPrompt(prompt) => {
                    let recipients = self.manager.announce_host(&prompt);
                    info!("Host prompt {:?} sent to {} connections", prompt, recipients);
                }
                Command::Kick {
                    username,
                    reason,
                    reply,
                } => {
                    let found = match self.manager.find_by_username(&username) {
                        Some(id) => {
                            info!("Kicking {} ({}) for {}", username, id, reason);
                            self.manager
                                .schedule_removal(id, RemovalCause::Kicked(reason));
                            true
                        }
                        None => false,
                    };
                    let _ = reply.send(found);
                }
                Command::List { reply } => {
                    let _ = reply.send(self.manager.snapshot());
                }
                Command::Shutdown { reason, done } => {
                    self.begin_shutdown(&reason);
                    self.shutdown_waiters.push(done);
                }
            }
        }
    }

    /// Stops accepting and schedules every connection for removal
    fn begin_shutdown(&mut self, reason: &str) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!(
            "Shutting down ({}), closing {} connections",
            reason,
            self.manager.len()
        );

        if let Some(mut listener) = self.listener.take() {
            if let Err(e) = self.poll.registry().deregister(&mut listener) {
                debug!("Failed to deregister the listener: {}", e);
            }
        }

        for id in self.manager.ids() {
            self.manager
                .schedule_removal(id, RemovalCause::Kicked(reason.to_string()));
        }
    }

    fn finish_shutdown(&mut self) {
        for done in self.shutdown_waiters.drain(..) {
            let _ = done.send(());
        }
        self.handle.stop();
        info!("Server on {} stopped", self.local_addr);
    }

    fn accept_connections(&mut self, now: Instant) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        let mut unregistered = Vec::new();
        loop {
            match listener.accept() {
                Ok((mut stream, peer_addr)) => {
                    let id = self.manager.accept(peer_addr);
                    match self
                        .poll
                        .registry()
                        .register(&mut stream, Token(id), Interest::READABLE)
                    {
                        Ok(()) => {
                            self.streams.insert(id, stream);
                        }
                        Err(e) => {
                            error!("Failed to register connection {}: {}", id, e);
                            unregistered.push(id);
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Failed to accept a connection: {}", e);
                    break;
                }
            }
        }

        for id in unregistered {
            self.remove(id, RemovalCause::Broken, now);
        }
    }

    /// Reads everything available from `id` and relays the completed frames
    ///
    /// Returns the teardown cause when the peer closed, the socket failed or
    /// the peer sent an oversized frame.
    fn receive(
        &mut self,
        id: ConnectionId,
        now: Instant,
        scratch: &mut [u8],
        limits: ReadLimits,
    ) -> Option<RemovalCause> {
        let conn = self.manager.get_mut(id)?;
        if !conn.accepts_traffic() {
            return None;
        }
        let stream = self.streams.get_mut(&id)?;

        let ReadOutcome { frames, end } = conn.read_from(stream, scratch, limits);
        self.manager.ingest(id, frames, now);

        match end {
            ReadEnd::WouldBlock => None,
            ReadEnd::BudgetSpent => {
                self.unfinished_reads.insert(id);
                None
            }
            ReadEnd::FrameTooLong => {
                warn!(
                    "Connection {} sent a frame longer than {} bytes",
                    id, limits.max_frame_len
                );
                Some(RemovalCause::Kicked(FRAME_TOO_LONG_REASON.to_string()))
            }
            ReadEnd::Closed => {
                info!("Connection {} closed by peer", id);
                Some(RemovalCause::PeerClosed)
            }
            ReadEnd::Failed(e) => {
                warn!("Read from connection {} failed: {}", id, e);
                Some(RemovalCause::Broken)
            }
        }
    }

    /// Writes queued output for every connection that has some
    ///
    /// Writes are attempted whether or not the socket was reported writable;
    /// write interest only matters once a socket has pushed back. Returns the
    /// connections whose writes failed.
    fn send_pending(&mut self) -> Vec<ConnectionId> {
        let mut failed = Vec::new();
        for (id, stream) in self.streams.iter_mut() {
            let Some(conn) = self.manager.get_mut(*id) else {
                continue;
            };
            if conn.is_broken() || !conn.has_pending_output() {
                continue;
            }
            if let Err(e) = conn.flush_into(stream) {
                warn!("Write to connection {} failed: {}", id, e);
                failed.push(*id);
            }
        }
        failed
    }

    fn remove(&mut self, id: ConnectionId, cause: RemovalCause, now: Instant) {
        match self.manager.begin_removal(id, cause, now) {
            Ok(RemovalProgress::Immediate) => self.close(id),
            Ok(RemovalProgress::Deferred) | Ok(RemovalProgress::AlreadyDraining) => {}
            Err(e) => debug!("Skipping removal: {}", e),
        }
    }

    /// Second removal phase: forget the record and close the socket
    fn close(&mut self, id: ConnectionId) {
        if let Err(e) = self.manager.finish_removal(id) {
            warn!("Cannot finish removal of connection {}: {}", id, e);
            return;
        }
        self.interest.remove(&id);
        self.unfinished_reads.remove(&id);
        if let Some(mut stream) = self.streams.remove(&id) {
            if let Err(e) = self.poll.registry().deregister(&mut stream) {
                debug!("Failed to deregister connection {}: {}", id, e);
            }
        }
    }

    /// Registers write interest exactly for sockets with output pending
    ///
    /// While writes are wanted the registration is renewed every iteration
    /// so an already writable socket reports again.
    fn rebuild_interest(&mut self) {
        for (id, stream) in self.streams.iter_mut() {
            let Some(conn) = self.manager.get(*id) else {
                continue;
            };
            let wanted = desired_interest(conn);
            let current = self.interest.get(id).copied().unwrap_or(Interest::READABLE);
            if wanted == current && !wanted.is_writable() {
                continue;
            }

            match self.poll.registry().reregister(stream, Token(*id), wanted) {
                Ok(()) if wanted == Interest::READABLE => {
                    self.interest.remove(id);
                }
                Ok(()) => {
                    self.interest.insert(*id, wanted);
                }
                Err(e) => {
                    warn!("Failed to update interest of connection {}: {}", id, e);
                    self.manager.schedule_removal(*id, RemovalCause::Broken);
                }
            }
        }
    }
}

/// Readiness a connection should be registered for
///
/// A draining connection is never read again, so it only waits for
/// writability; leaving it readable would make unread input wake the loop
/// on every renewal.
fn desired_interest(conn: &Connection) -> Interest {
    let wants_write = conn.has_pending_output() && !conn.is_broken();
    match (conn.is_draining(), wants_write) {
        (true, _) => Interest::WRITABLE,
        (false, true) => Interest::READABLE | Interest::WRITABLE,
        (false, false) => Interest::READABLE,
    }
}
