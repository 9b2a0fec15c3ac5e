//! Operator console
//!
//! Reads one command per line and forwards it to the running server through
//! its [`ControlHandle`]. Verbs are case-insensitive:
//!
//! - `listConnections` prints every connection
//! - `kick <username> [reason]` removes a participant
//! - `exit [reason]` kicks everyone and stops the server
//! - `help` prints the command list
//!
//! End of input behaves like `exit`.

use crate::connection_manager::ConnectionInfo;
use crate::control::{ControlHandle, DEFAULT_KICK_REASON, DEFAULT_SHUTDOWN_REASON};
use crate::error::ServerError;
use log::info;
use std::io::{BufRead, Write};
use std::str::FromStr;
use thiserror::Error;

const HELP: &str = "\
Commands:
  listConnections           show every connection
  kick <username> [reason]  remove a participant from the chat
  exit [reason]             disconnect everyone and stop the service
  help                      show this list";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    ListConnections,
    Kick { username: String, reason: String },
    Exit { reason: String },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownVerb(String),
    #[error("kick needs a username")]
    MissingUsername,
}

impl FromStr for AdminCommand {
    type Err = AdminParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_lowercase().as_str() {
            "" => Err(AdminParseError::Empty),
            "listconnections" => Ok(AdminCommand::ListConnections),
            "help" => Ok(AdminCommand::Help),
            "exit" => Ok(AdminCommand::Exit {
                reason: or_default(rest, DEFAULT_SHUTDOWN_REASON),
            }),
            "kick" => {
                let (username, reason) = match rest.split_once(char::is_whitespace) {
                    Some((username, reason)) => (username, reason.trim()),
                    None => (rest, ""),
                };
                if username.is_empty() {
                    return Err(AdminParseError::MissingUsername);
                }
                Ok(AdminCommand::Kick {
                    username: username.to_string(),
                    reason: or_default(reason, DEFAULT_KICK_REASON),
                })
            }
            _ => Err(AdminParseError::UnknownVerb(verb.to_string())),
        }
    }
}

fn or_default(text: &str, default: &str) -> String {
    if text.is_empty() {
        default.to_string()
    } else {
        text.to_string()
    }
}

/// Renders the `listConnections` table
pub fn format_connections(connections: &[ConnectionInfo]) -> String {
    if connections.is_empty() {
        return "No connections.".to_string();
    }

    let mut table = format!(
        "{:>6}  {:<20} {:<22} {:<19}  {}",
        "ID", "USERNAME", "ADDRESS", "LAST ACTIVITY", "STATE"
    );
    for conn in connections {
        table.push('\n');
        table.push_str(&format!(
            "{:>6}  {:<20} {:<22} {:<19}  {}",
            conn.id,
            conn.username.as_deref().unwrap_or("<pending>"),
            conn.peer_addr.to_string(),
            conn.last_activity.format("%Y-%m-%d %H:%M:%S").to_string(),
            conn.state
        ));
    }
    table
}

/// Runs the console until `exit`, end of input, or the server going away
pub fn run_console<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    handle: &ControlHandle,
) -> Result<(), ServerError> {
    writeln!(output, "Type \"help\" for the list of commands.")?;

    let mut lines = input.lines();
    loop {
        let command = match lines.next() {
            Some(line) => match line?.parse::<AdminCommand>() {
                Ok(command) => command,
                Err(AdminParseError::Empty) => continue,
                Err(e) => {
                    writeln!(output, "{}. Type \"help\" for the list of commands.", e)?;
                    continue;
                }
            },
            None => AdminCommand::Exit {
                reason: DEFAULT_SHUTDOWN_REASON.to_string(),
            },
        };

        let outcome = match command {
            AdminCommand::ListConnections => handle
                .list_connections()
                .map(|connections| format_connections(&connections)),
            AdminCommand::Kick { username, reason } => {
                handle.kick(&username, &reason).map(|found| {
                    if found {
                        format!("Kicked {} for {}.", username, reason)
                    } else {
                        format!("No participant named {}.", username)
                    }
                })
            }
            AdminCommand::Help => Ok(HELP.to_string()),
            AdminCommand::Exit { reason } => {
                writeln!(output, "Service is shutting down.")?;
                info!("The service is stopping due to operator request: {}", reason);
                return match handle.shutdown(&reason) {
                    Ok(()) | Err(ServerError::Stopped) => Ok(()),
                    Err(e) => Err(e),
                };
            }
        };

        match outcome {
            Ok(text) => writeln!(output, "{}", text)?,
            Err(ServerError::Stopped) => {
                writeln!(output, "The server is no longer running.")?;
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}
