//! Runtime settings for the relay server

use crate::connection::ReadLimits;
use shared::DEFAULT_PORT;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables of one server run
///
/// The defaults reproduce the behaviour operators expect from the chat
/// service: port 2020, a 4 second spam window with a ceiling of 10 frames,
/// and a host prompt every 90 seconds that rotates after a minute.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listening socket to
    pub bind: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Upper bound on one readiness wait so housekeeping runs when idle
    pub poll_timeout: Duration,
    /// Gap after which a connection's message counter starts over
    pub spam_window: Duration,
    /// Frames allowed per window before the sender is kicked
    pub spam_ceiling: u32,
    /// How long a kicked connection may take to flush its farewell
    pub drain_timeout: Duration,
    /// Longest frame a participant may send; longer ones get it kicked
    pub max_frame_len: usize,
    /// Bytes read from one connection per loop iteration
    pub read_budget: usize,
    /// Delay between two host prompts
    pub host_interval: Duration,
    /// How long one prompt stays active before another is drawn
    pub prompt_lifetime: Duration,
    /// Newline separated list of conversation starters
    pub prompts_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            poll_timeout: Duration::from_millis(500),
            spam_window: Duration::from_secs(4),
            spam_ceiling: 10,
            drain_timeout: Duration::from_secs(5),
            max_frame_len: 16 * 1024,
            read_budget: 64 * 1024,
            host_interval: Duration::from_secs(90),
            prompt_lifetime: Duration::from_secs(60),
            prompts_file: None,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits {
            max_frame_len: self.max_frame_len,
            read_budget: self.read_budget,
        }
    }

    /// Loopback on an ephemeral port, used by tests
    pub fn loopback() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            poll_timeout: Duration::from_millis(50),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 2020);
        assert_eq!(config.spam_window, Duration::from_secs(4));
        assert_eq!(config.spam_ceiling, 10);
        assert_eq!(config.read_limits().max_frame_len, 16 * 1024);
        assert!(config.read_budget >= config.max_frame_len);
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:2020");
    }

    #[test]
    fn test_loopback_config_uses_ephemeral_port() {
        let config = ServerConfig::loopback();
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:0");
        assert!(config.poll_timeout < ServerConfig::default().poll_timeout);
    }
}
