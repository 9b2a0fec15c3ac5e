//! Error types of the relay server

use crate::connection::ConnectionId;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("readiness wait failed: {0}")]
    Poll(#[source] io::Error),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("the server is no longer running")]
    Stopped,
}

/// Misuse of the two-phase removal protocol
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("connection {0} is not known")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} must begin removal before it can finish")]
    NotDraining(ConnectionId),
}
