//! Owner of every connection record and of the chat history
//!
//! This module handles the bookkeeping side of the relay:
//! - Accepting new peers and seeding them with the history backlog
//! - Looking connections up by id or username
//! - Queuing forced removals until the loop reaches its removal phase
//! - Producing read-only snapshots for the administrative console
//!
//! Relaying lives in `relay.rs` and two-phase removal in `lifecycle.rs`;
//! both extend [`ConnectionManager`]. The manager is only ever touched from
//! the multiplexer thread, so it needs no locking.

use crate::connection::{Connection, ConnectionId, ConnectionState, RemovalCause};
use crate::history::ChatHistory;
use crate::spam::SpamPolicy;
use chrono::{DateTime, Local};
use log::info;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Read-only view of one connection, as printed by `listConnections`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub username: Option<String>,
    pub peer_addr: SocketAddr,
    pub last_activity: DateTime<Local>,
    pub state: &'static str,
}

pub struct ConnectionManager {
    pub(crate) connections: BTreeMap<ConnectionId, Connection>,
    pub(crate) history: ChatHistory,
    pub(crate) spam: SpamPolicy,
    scheduled: Vec<(ConnectionId, RemovalCause)>,
    next_id: ConnectionId,
}

impl ConnectionManager {
    /// Creates an empty manager whose ids start at `first_id`
    pub fn new(spam: SpamPolicy, first_id: ConnectionId) -> Self {
        Self {
            connections: BTreeMap::new(),
            history: ChatHistory::new(),
            spam,
            scheduled: Vec::new(),
            next_id: first_id,
        }
    }

    /// Registers a freshly accepted peer
    ///
    /// The new record starts with a copy of the whole history followed by the
    /// start-of-new-messages marker in its outbound queue.
    pub fn accept(&mut self, peer_addr: SocketAddr) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;

        let mut connection = Connection::new(id, peer_addr);
        for message in self.history.replay() {
            connection.enqueue(message);
        }

        info!(
            "Connection {} accepted from {} ({} history messages queued)",
            id,
            peer_addr,
            self.history.len()
        );
        self.connections.insert(id, connection);
        id
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Finds an identified connection by its display name
    pub fn find_by_username(&self, username: &str) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|conn| conn.username() == Some(username) && !conn.is_draining())
            .map(|conn| conn.id)
    }

    pub(crate) fn username_taken(&self, username: &str) -> bool {
        self.connections.values().any(|conn| {
            conn.username()
                .is_some_and(|name| name.eq_ignore_ascii_case(username))
        })
    }

    /// Queues a removal for the loop's forced-removal phase
    pub fn schedule_removal(&mut self, id: ConnectionId, cause: RemovalCause) {
        if !self.scheduled.iter().any(|(queued, _)| *queued == id) {
            self.scheduled.push((id, cause));
        }
    }

    pub fn take_scheduled_removals(&mut self) -> Vec<(ConnectionId, RemovalCause)> {
        std::mem::take(&mut self.scheduled)
    }

    pub fn is_scheduled(&self, id: ConnectionId) -> bool {
        self.scheduled.iter().any(|(queued, _)| *queued == id)
    }

    /// Draining connections whose output is flushed or whose time is up
    pub fn drained(&self, now: Instant, drain_timeout: Duration) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|conn| match conn.state() {
                ConnectionState::Draining { since, .. } => {
                    !conn.has_pending_output()
                        || conn.is_broken()
                        || now.saturating_duration_since(*since) >= drain_timeout
                }
                _ => false,
            })
            .map(|conn| conn.id)
            .collect()
    }

    /// Snapshot of every connection in id order
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        self.connections
            .values()
            .map(|conn| ConnectionInfo {
                id: conn.id,
                username: conn.username().map(str::to_string),
                peer_addr: conn.peer_addr,
                last_activity: conn.last_activity,
                state: conn.state().label(),
            })
            .collect()
    }

    /// Returns the number of connections, draining ones included
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
