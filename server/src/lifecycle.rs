//! Two-phase removal of connections
//!
//! Phase one ([`ConnectionManager::begin_removal`]) tells the remaining
//! participants that the user left and, for server-initiated removals,
//! queues a farewell carrying the reason. Phase two
//! ([`ConnectionManager::finish_removal`]) discards the record once that
//! farewell has been written; the caller then closes the socket. A broken
//! socket cannot carry either message, so both phases collapse into one.

use crate::connection::{Connection, ConnectionId, ConnectionState, RemovalCause};
use crate::connection_manager::ConnectionManager;
use crate::error::LifecycleError;
use log::{debug, info};
use std::time::Instant;

/// What the caller must do after [`ConnectionManager::begin_removal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalProgress {
    /// A farewell is queued; finish once the output is drained
    Deferred,
    /// Nothing can or needs to be sent; finish right away
    Immediate,
    /// Removal had already begun and continues unchanged
    AlreadyDraining,
}

impl ConnectionManager {
    /// Phase one: announce the departure and stop reading from the peer
    pub fn begin_removal(
        &mut self,
        id: ConnectionId,
        cause: RemovalCause,
        now: Instant,
    ) -> Result<RemovalProgress, LifecycleError> {
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(LifecycleError::UnknownConnection(id))?;

        if conn.is_draining() {
            if cause == RemovalCause::Broken {
                conn.mark_broken();
                conn.discard_output();
                return Ok(RemovalProgress::Immediate);
            }
            debug!("Connection {} is already being removed", id);
            return Ok(RemovalProgress::AlreadyDraining);
        }

        if cause == RemovalCause::Broken {
            conn.mark_broken();
        }
        let broken = conn.is_broken();
        let username = conn.username().map(str::to_string);
        let reason = match &cause {
            RemovalCause::Kicked(reason) => Some(reason.clone()),
            _ => None,
        };

        conn.set_state(ConnectionState::Draining {
            username: username.clone(),
            reason: reason.clone(),
            since: now,
        });

        let progress = match reason {
            Some(reason) if !broken => {
                conn.enqueue(shared::kick_notice(&reason));
                RemovalProgress::Deferred
            }
            _ => {
                conn.discard_output();
                RemovalProgress::Immediate
            }
        };

        info!(
            "Removing connection {} ({}) user {:?}: {:?}",
            id,
            conn.peer_addr,
            username.as_deref().unwrap_or("<pending>"),
            cause
        );

        if !broken {
            if let Some(username) = username {
                self.broadcast_except(Some(id), shared::leave_notice(&username));
            }
        }

        Ok(progress)
    }

    /// Phase two: drop the record of a connection that began removal
    ///
    /// Rejects connections that never went through phase one.
    pub fn finish_removal(&mut self, id: ConnectionId) -> Result<Connection, LifecycleError> {
        match self.connections.get(&id) {
            None => return Err(LifecycleError::UnknownConnection(id)),
            Some(conn) if !conn.is_draining() => return Err(LifecycleError::NotDraining(id)),
            Some(_) => {}
        }

        let mut conn = self
            .connections
            .remove(&id)
            .ok_or(LifecycleError::UnknownConnection(id))?;
        conn.set_state(ConnectionState::Closed);
        info!("Connection {} from {} closed", id, conn.peer_addr);
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spam::SpamPolicy;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            SpamPolicy {
                window: Duration::from_secs(4),
                ceiling: 10,
            },
            1,
        )
    }

    fn join(manager: &mut ConnectionManager, name: &str) -> ConnectionId {
        let port = 6000 + manager.len() as u16;
        let id = manager.accept(SocketAddr::from(([127, 0, 0, 1], port)));
        manager.ingest(id, vec![name.to_string()], Instant::now());
        id
    }

    fn last_queued(manager: &ConnectionManager, id: ConnectionId) -> Option<String> {
        manager.get(id).unwrap().outbound().last().map(str::to_string)
    }

    #[test]
    fn test_finish_without_begin_is_rejected() {
        let mut manager = manager();
        let alice = join(&mut manager, "Alice");

        assert_eq!(
            manager.finish_removal(alice).unwrap_err(),
            LifecycleError::NotDraining(alice)
        );
        assert!(manager.contains(alice));
        assert_eq!(
            manager.finish_removal(999).unwrap_err(),
            LifecycleError::UnknownConnection(999)
        );
    }

    #[test]
    fn test_kick_queues_farewell_and_notifies_peers() {
        let mut manager = manager();
        let alice = join(&mut manager, "Alice");
        let bob = join(&mut manager, "Bob");

        let progress = manager
            .begin_removal(bob, RemovalCause::Kicked("rude behavior".into()), Instant::now())
            .unwrap();

        assert_eq!(progress, RemovalProgress::Deferred);
        assert_eq!(
            last_queued(&manager, bob).as_deref(),
            Some("Kicked by the host for rude behavior")
        );
        assert_eq!(
            last_queued(&manager, alice).as_deref(),
            Some("Host: User Bob left the chat.")
        );
        assert_eq!(manager.get(bob).unwrap().kick_reason(), Some("rude behavior"));
        assert_eq!(manager.find_by_username("Bob"), None);
    }

    #[test]
    fn test_finish_after_begin_removes_record() {
        let mut manager = manager();
        let bob = join(&mut manager, "Bob");

        manager
            .begin_removal(bob, RemovalCause::Kicked("bye".into()), Instant::now())
            .unwrap();
        let closed = manager.finish_removal(bob).unwrap();

        assert_eq!(closed.state(), &ConnectionState::Closed);
        assert!(!manager.contains(bob));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_broken_connection_collapses_phases_silently() {
        let mut manager = manager();
        let alice = join(&mut manager, "Alice");
        let bob = join(&mut manager, "Bob");
        let history_before = manager.history().len();
        let alice_before = manager.get(alice).unwrap().outbound().count();

        let progress = manager
            .begin_removal(bob, RemovalCause::Broken, Instant::now())
            .unwrap();

        assert_eq!(progress, RemovalProgress::Immediate);
        assert!(manager.get(bob).unwrap().is_broken());
        assert!(!manager.get(bob).unwrap().has_pending_output());
        assert_eq!(manager.history().len(), history_before);
        assert_eq!(manager.get(alice).unwrap().outbound().count(), alice_before);
    }

    #[test]
    fn test_peer_close_notifies_without_farewell() {
        let mut manager = manager();
        let alice = join(&mut manager, "Alice");
        let bob = join(&mut manager, "Bob");

        let progress = manager
            .begin_removal(bob, RemovalCause::PeerClosed, Instant::now())
            .unwrap();

        assert_eq!(progress, RemovalProgress::Immediate);
        assert!(!manager.get(bob).unwrap().has_pending_output());
        assert_eq!(
            last_queued(&manager, alice).as_deref(),
            Some("Host: User Bob left the chat.")
        );
    }

    #[test]
    fn test_unidentified_connection_leaves_silently() {
        let mut manager = manager();
        let alice = join(&mut manager, "Alice");
        let pending = manager.accept(SocketAddr::from(([127, 0, 0, 1], 7000)));
        let alice_before = manager.get(alice).unwrap().outbound().count();

        manager
            .begin_removal(
                pending,
                RemovalCause::Kicked("no valid identity provided".into()),
                Instant::now(),
            )
            .unwrap();

        assert_eq!(manager.get(alice).unwrap().outbound().count(), alice_before);
        assert_eq!(
            last_queued(&manager, pending).as_deref(),
            Some("Kicked by the host for no valid identity provided")
        );
    }

    #[test]
    fn test_second_begin_keeps_first_reason() {
        let mut manager = manager();
        let bob = join(&mut manager, "Bob");
        let now = Instant::now();

        manager
            .begin_removal(bob, RemovalCause::Kicked("first".into()), now)
            .unwrap();
        let again = manager
            .begin_removal(bob, RemovalCause::Kicked("second".into()), now)
            .unwrap();

        assert_eq!(again, RemovalProgress::AlreadyDraining);
        assert_eq!(manager.get(bob).unwrap().kick_reason(), Some("first"));

        let broken = manager.begin_removal(bob, RemovalCause::Broken, now).unwrap();
        assert_eq!(broken, RemovalProgress::Immediate);
        assert!(manager.get(bob).unwrap().is_broken());
    }

    #[test]
    fn test_drained_reports_flushed_and_expired_connections() {
        let mut manager = manager();
        let quick = join(&mut manager, "Quick");
        let stalled = join(&mut manager, "Stalled");
        let start = Instant::now();
        let timeout = Duration::from_secs(5);

        manager
            .begin_removal(quick, RemovalCause::Kicked("x".into()), start)
            .unwrap();
        manager
            .begin_removal(stalled, RemovalCause::Kicked("y".into()), start)
            .unwrap();
        assert!(manager.drained(start, timeout).is_empty());

        manager.get_mut(quick).unwrap().discard_output();
        assert_eq!(manager.drained(start, timeout), vec![quick]);

        let later = start + timeout;
        assert_eq!(manager.drained(later, timeout), vec![quick, stalled]);
    }
}
