//! Message-rate accounting used to drop flooding connections
//!
//! Each connection carries a [`RateCounter`]. The counter restarts whenever
//! the gap since the previous reception exceeds the policy window, so only
//! messages that keep arriving in quick succession accumulate.

use std::time::{Duration, Instant};

/// Thresholds shared by every connection
#[derive(Debug, Clone, Copy)]
pub struct SpamPolicy {
    pub window: Duration,
    pub ceiling: u32,
}

/// Why a connection was judged abusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamVerdict {
    /// The counter reached the ceiling inside one window
    WindowExceeded,
    /// A single receive cycle alone carried more frames than the ceiling
    Burst,
}

impl SpamVerdict {
    pub fn reason(&self) -> &'static str {
        match self {
            SpamVerdict::WindowExceeded => "too many messages in the same window",
            SpamVerdict::Burst => "too many messages in rapid succession",
        }
    }
}

/// Per-connection rolling counter
#[derive(Debug, Clone, Default)]
pub struct RateCounter {
    count: u32,
    last_reception: Option<Instant>,
}

impl RateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for one receive cycle that produced `frames` complete frames
    pub fn record(&mut self, policy: &SpamPolicy, frames: usize, now: Instant) -> Option<SpamVerdict> {
        if frames == 0 {
            return None;
        }

        let window_expired = self
            .last_reception
            .map_or(true, |last| now.saturating_duration_since(last) > policy.window);
        if window_expired {
            self.count = 0;
        }
        self.last_reception = Some(now);

        let frames = u32::try_from(frames).unwrap_or(u32::MAX);
        self.count = self.count.saturating_add(frames);

        if frames > policy.ceiling {
            Some(SpamVerdict::Burst)
        } else if self.count >= policy.ceiling {
            Some(SpamVerdict::WindowExceeded)
        } else {
            None
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
