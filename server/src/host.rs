//! The simulated host participant and its conversation starters

use crate::control::ControlHandle;
use crate::error::ServerError;
use log::{debug, info, warn};
use rand::Rng;
use std::fs;
use std::io;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Used when no prompts file is configured or it yields nothing
pub const DEFAULT_PROMPTS: &[&str] = &[
    "What is your favourite sport?",
    "Has anyone been painting or drawing lately?",
    "How is the weather where you are?",
    "What did everyone do this weekend?",
    "Which do you prefer, playing football or watching it?",
    "Do you know a good museum or gallery nearby?",
];

/// Granularity at which the generator thread notices a stop request
const STOP_CHECK: Duration = Duration::from_millis(100);

/// Rotating list of conversation starters
///
/// One prompt is active at a time. Once it has been active for longer than
/// the configured lifetime, the next read picks a new one at random.
#[derive(Debug)]
pub struct HostPrompts {
    prompts: Vec<String>,
    lifetime: Duration,
    active: Option<(usize, Instant)>,
}

impl HostPrompts {
    pub fn new(prompts: Vec<String>, lifetime: Duration) -> Self {
        let prompts: Vec<String> = prompts
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let prompts = if prompts.is_empty() {
            DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect()
        } else {
            prompts
        };

        Self {
            prompts,
            lifetime,
            active: None,
        }
    }

    /// Loads one prompt per line from `path`
    ///
    /// An unreadable or empty file falls back to [`DEFAULT_PROMPTS`].
    pub fn load(path: Option<&Path>, lifetime: Duration) -> Self {
        let lines = match path {
            Some(path) => match fs::read_to_string(path) {
                Ok(contents) => contents.lines().map(str::to_string).collect(),
                Err(e) => {
                    warn!(
                        "Cannot read prompts from {}: {}, using built-in prompts",
                        path.display(),
                        e
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let prompts = Self::new(lines, lifetime);
        info!("Host has {} conversation starters", prompts.len());
        prompts
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// The active prompt, rotated first if its lifetime is over
    pub fn current(&mut self, now: Instant) -> &str {
        let expired = match self.active {
            Some((_, since)) => now.saturating_duration_since(since) > self.lifetime,
            None => true,
        };
        if expired {
            let index = rand::thread_rng().gen_range(0..self.prompts.len());
            debug!("Host switches to prompt {}", index);
            self.active = Some((index, now));
        }

        let index = self.active.map_or(0, |(index, _)| index);
        &self.prompts[index]
    }
}

/// Starts the thread that announces the active prompt every `interval`
///
/// The first announcement happens one interval after start. The thread exits
/// once the server stops.
pub fn spawn_host_generator(
    mut prompts: HostPrompts,
    interval: Duration,
    handle: ControlHandle,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("host".to_string())
        .spawn(move || loop {
            if !sleep_unless_stopped(interval, &handle) {
                break;
            }

            let prompt = prompts.current(Instant::now()).to_string();
            match handle.announce(prompt) {
                Ok(()) => {}
                Err(ServerError::Stopped) => break,
                Err(e) => warn!("Failed to hand a host prompt to the server: {}", e),
            }
        })
}

/// Sleeps for `duration`; returns false as soon as the server stops
fn sleep_unless_stopped(duration: Duration, handle: &ControlHandle) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if handle.is_stopped() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(STOP_CHECK));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_list_falls_back_to_defaults() {
        let prompts = HostPrompts::new(vec![String::new(), "   ".to_string()], Duration::from_secs(60));
        assert_eq!(prompts.len(), DEFAULT_PROMPTS.len());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let prompts = HostPrompts::load(
            Some(Path::new("/nonexistent/conversation_starters.txt")),
            Duration::from_secs(60),
        );
        assert_eq!(prompts.len(), DEFAULT_PROMPTS.len());
    }

    #[test]
    fn test_load_drops_blank_lines() {
        let path = std::env::temp_dir().join(format!("host_prompts_{}.txt", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "Who likes tennis?\n\nWhat are you drawing?\n").unwrap();

        let mut prompts = HostPrompts::load(Some(&path), Duration::from_secs(60));
        fs::remove_file(&path).unwrap();

        assert_eq!(prompts.len(), 2);
        let current = prompts.current(Instant::now()).to_string();
        assert!(current == "Who likes tennis?" || current == "What are you drawing?");
    }

    #[test]
    fn test_prompt_is_stable_within_lifetime() {
        let mut prompts = HostPrompts::new(
            DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
            Duration::from_secs(60),
        );
        let start = Instant::now();

        let first = prompts.current(start).to_string();
        let later = prompts.current(start + Duration::from_secs(59)).to_string();

        assert_eq!(first, later);
        assert!(DEFAULT_PROMPTS.contains(&first.as_str()));
    }

    #[test]
    fn test_prompt_rotates_after_lifetime() {
        let mut prompts = HostPrompts::new(vec!["only one".to_string()], Duration::from_secs(60));
        let start = Instant::now();

        prompts.current(start);
        let (_, activated) = prompts.active.unwrap();
        prompts.current(start + Duration::from_secs(61));
        let (_, reactivated) = prompts.active.unwrap();

        assert_eq!(activated, start);
        assert_eq!(reactivated, start + Duration::from_secs(61));
    }
}
