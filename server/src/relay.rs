//! Fan-out of received frames to every other participant

use crate::connection::{ConnectionId, ConnectionState, RemovalCause};
use crate::connection_manager::ConnectionManager;
use log::{debug, info, warn};
use std::time::Instant;

/// Kick reason for a first frame that is not a usable display name
pub const INVALID_IDENTITY_REASON: &str = "no valid identity provided";
/// Kick reason for a frame longer than the configured limit
pub const FRAME_TOO_LONG_REASON: &str = "message too long";

impl ConnectionManager {
    /// Handles the frames completed by one receive cycle of `origin`
    ///
    /// The cycle is first charged to the sender's rate counter; a cycle that
    /// trips the abuse detector is dropped and the sender is scheduled for
    /// removal. Otherwise the first frame a connection ever sends is taken as
    /// its identity and every later frame is relayed verbatim.
    pub fn ingest(&mut self, origin: ConnectionId, frames: Vec<String>, now: Instant) {
        if frames.is_empty() {
            return;
        }

        let Some(conn) = self.connections.get_mut(&origin) else {
            warn!("Dropping {} frames from unknown connection {}", frames.len(), origin);
            return;
        };
        if !conn.accepts_traffic() {
            debug!("Ignoring {} frames from draining connection {}", frames.len(), origin);
            return;
        }

        conn.touch();
        if let Some(verdict) = conn.rate.record(&self.spam, frames.len(), now) {
            warn!(
                "Connection {} ({}) flagged for spam: {}",
                origin,
                conn.peer_addr,
                verdict.reason()
            );
            self.schedule_removal(origin, RemovalCause::Kicked(verdict.reason().to_string()));
            return;
        }

        for frame in frames {
            let identified = match self.connections.get(&origin).map(|c| c.state()) {
                Some(ConnectionState::Connecting) => false,
                Some(ConnectionState::Active { .. }) => true,
                _ => break,
            };

            if identified {
                self.broadcast_except(Some(origin), frame);
            } else if !self.register_identity(origin, &frame) {
                break;
            }
        }
    }

    /// Promotes a connecting peer to active using its first frame
    ///
    /// Returns false when the frame was rejected and the connection has been
    /// scheduled for removal.
    fn register_identity(&mut self, origin: ConnectionId, frame: &str) -> bool {
        let username = match shared::parse_identity(frame) {
            Ok(username) => username,
            Err(e) => {
                warn!("Connection {} sent an invalid identity {:?}: {}", origin, frame, e);
                self.schedule_removal(
                    origin,
                    RemovalCause::Kicked(INVALID_IDENTITY_REASON.to_string()),
                );
                return false;
            }
        };

        if self.username_taken(&username) {
            warn!("Connection {} asked for the taken username {}", origin, username);
            self.schedule_removal(
                origin,
                RemovalCause::Kicked(format!("the username {} is already in use", username)),
            );
            return false;
        }

        if let Some(conn) = self.connections.get_mut(&origin) {
            info!("Connection {} identified as {}", origin, username);
            conn.set_state(ConnectionState::Active {
                username: username.clone(),
            });
        }
        self.broadcast_except(Some(origin), shared::join_notice(&username));
        true
    }

    /// Appends `message` to history and queues it for every other connection
    ///
    /// Draining connections are skipped. Returns the number of recipients.
    pub fn broadcast_except(&mut self, origin: Option<ConnectionId>, message: String) -> usize {
        let mut recipients = 0;
        for conn in self.connections.values_mut() {
            if Some(conn.id) != origin && conn.accepts_traffic() {
                conn.enqueue(message.clone());
                recipients += 1;
            }
        }
        debug!("Relayed {:?} to {} connections", message, recipients);
        self.history.append(message);
        recipients
    }

    /// Injects a host prompt for every connection
    pub fn announce_host(&mut self, prompt: &str) -> usize {
        self.broadcast_except(None, shared::host_line(prompt))
    }
}
