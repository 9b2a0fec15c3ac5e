//! # Chat Relay Server Library
//!
//! This library implements a single-topic chat relay. The server accepts TCP
//! connections, forwards every message a participant sends to all other
//! participants, and periodically injects conversation starters on behalf of
//! a simulated host.
//!
//! ## Core Responsibilities
//!
//! ### Relay
//! The first frame a connection sends is its display name. Every later frame
//! is relayed verbatim to every other connection and appended to the chat
//! history, which newcomers receive in full before live traffic.
//!
//! ### Connection Lifecycle
//! Connections move through `Connecting -> Active -> Draining -> Closed`.
//! Server-initiated removals are two-phase: the farewell is queued first and
//! the socket is closed only once it has been written.
//!
//! ### Abuse Prevention
//! A per-connection rate counter kicks participants that send too many
//! messages in quick succession.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! One thread owns the listener, every socket and every connection record,
//! and drives them from a `mio` readiness loop. The console and the host
//! generator run on their own threads and talk to the loop only through a
//! [`control::ControlHandle`].
//!
//! ## Module Organization
//!
//! - `network`: the readiness loop
//! - `connection`, `connection_manager`: per-peer records and their owner
//! - `relay`, `lifecycle`, `history`, `spam`: relay rules
//! - `control`, `admin`, `host`: cross-thread commands and their producers
//! - `config`, `error`, `logging`: ambient plumbing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! fn main() -> Result<(), server::error::ServerError> {
//!     let mut server = Server::bind(ServerConfig::default())?;
//!     let handle = server.control_handle();
//!
//!     std::thread::spawn(move || {
//!         let stdin = std::io::stdin();
//!         let _ = server::admin::run_console(stdin.lock(), std::io::stdout(), &handle);
//!     });
//!
//!     server.run()
//! }
//! ```

pub mod admin;
pub mod config;
pub mod connection;
pub mod connection_manager;
pub mod control;
pub mod error;
pub mod history;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod network;
pub mod relay;
pub mod spam;
