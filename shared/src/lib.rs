//! Wire vocabulary shared by the chat relay server and its participants
//!
//! The protocol is plain text over TCP. Each frame is `<sender>: <body>`
//! followed by [`END_OF_MSG`]; the first frame a participant sends is its
//! bare display name. The server additionally emits a handful of synthetic
//! notices which are built and recognised by the helpers in this crate.

pub mod codec;

pub use codec::{decode, encode, Decoded, FrameBuffer};

use thiserror::Error;

/// Literal frame terminator, never escaped inside a body
pub const END_OF_MSG: &str = "::EOMsg::";
/// Port the server listens on when none is given
pub const DEFAULT_PORT: u16 = 2020;
/// Display name of the simulated host participant
pub const HOST_NAME: &str = "Host";
/// Separates replayed history from live traffic for a newcomer
pub const START_NEW_MESSAGES: &str = "------------[Start new messages]------------";
/// Longest display name the server accepts
pub const MAX_USERNAME_LEN: usize = 32;

const KICK_PREFIX: &str = "Kicked by the host for ";

/// Why an identity announcement was rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("the display name is empty")]
    Empty,
    #[error("the display name is longer than {} characters", MAX_USERNAME_LEN)]
    TooLong,
    #[error("the display name contains a forbidden character {0:?}")]
    ForbiddenCharacter(char),
    #[error("the display name {0:?} is reserved")]
    Reserved(String),
}

/// Parses the identity announcement that opens every connection
///
/// The frame must consist of the display name alone. A `:` would make the
/// name indistinguishable from a `<sender>: <body>` chat frame, so it is
/// rejected together with control characters.
pub fn parse_identity(frame: &str) -> Result<String, IdentityError> {
    let name = frame.trim();

    if name.is_empty() {
        return Err(IdentityError::Empty);
    }
    if name.chars().count() > MAX_USERNAME_LEN {
        return Err(IdentityError::TooLong);
    }
    if let Some(c) = name.chars().find(|c| *c == ':' || c.is_control()) {
        return Err(IdentityError::ForbiddenCharacter(c));
    }
    if name.eq_ignore_ascii_case(HOST_NAME) {
        return Err(IdentityError::Reserved(name.to_string()));
    }

    Ok(name.to_string())
}

/// Formats a chat frame body as `<sender>: <text>`
pub fn chat_line(sender: &str, text: &str) -> String {
    format!("{}: {}", sender, text)
}

/// Splits a chat frame into sender and text, if it has that shape
pub fn split_chat_line(frame: &str) -> Option<(&str, &str)> {
    frame.split_once(": ")
}

/// Message from the host participant
pub fn host_line(text: &str) -> String {
    chat_line(HOST_NAME, text)
}

pub fn join_notice(username: &str) -> String {
    format!("User {} has joined the chat!", username)
}

pub fn leave_notice(username: &str) -> String {
    host_line(&format!("User {} left the chat.", username))
}

/// Final frame sent to a connection the server is removing
pub fn kick_notice(reason: &str) -> String {
    format!("{}{}", KICK_PREFIX, reason)
}

/// Extracts the reason from a kick notice
pub fn parse_kick_notice(frame: &str) -> Option<&str> {
    frame.trim_start().strip_prefix(KICK_PREFIX)
}

/// Extracts the username from a join notice
pub fn parse_join_notice(frame: &str) -> Option<&str> {
    let rest = frame.trim().strip_prefix("User ")?;
    rest.strip_suffix(" has joined the chat!")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity_accepts_plain_name() {
        assert_eq!(parse_identity("Alice"), Ok("Alice".to_string()));
        assert_eq!(parse_identity("  Sport_Bot \n"), Ok("Sport_Bot".to_string()));
        assert_eq!(parse_identity("Ola Nordmann"), Ok("Ola Nordmann".to_string()));
    }

    #[test]
    fn test_parse_identity_rejects_invalid_names() {
        assert_eq!(parse_identity(""), Err(IdentityError::Empty));
        assert_eq!(parse_identity("   "), Err(IdentityError::Empty));
        assert_eq!(
            parse_identity("Alice: hello"),
            Err(IdentityError::ForbiddenCharacter(':'))
        );
        assert_eq!(
            parse_identity("tab\there"),
            Err(IdentityError::ForbiddenCharacter('\t'))
        );
        assert_eq!(
            parse_identity("host"),
            Err(IdentityError::Reserved("host".to_string()))
        );
        assert_eq!(parse_identity(&"x".repeat(33)), Err(IdentityError::TooLong));
        assert!(parse_identity(&"x".repeat(32)).is_ok());
    }

    #[test]
    fn test_notice_formats() {
        assert_eq!(join_notice("Alice"), "User Alice has joined the chat!");
        assert_eq!(leave_notice("Bob"), "Host: User Bob left the chat.");
        assert_eq!(kick_notice("rude behavior"), "Kicked by the host for rude behavior");
        assert_eq!(host_line("Hi all"), "Host: Hi all");
    }

    #[test]
    fn test_notice_parsers() {
        assert_eq!(
            parse_kick_notice("Kicked by the host for rude behavior"),
            Some("rude behavior")
        );
        assert_eq!(parse_kick_notice("Bob: Kicked by the host for x"), None);
        assert_eq!(
            parse_join_notice("\nUser Testuser has joined the chat!"),
            Some("Testuser")
        );
        assert_eq!(parse_join_notice("Host: User Bob left the chat."), None);
    }

    #[test]
    fn test_split_chat_line() {
        assert_eq!(split_chat_line("Bob: Hello"), Some(("Bob", "Hello")));
        assert_eq!(split_chat_line("Bob: a: b"), Some(("Bob", "a: b")));
        assert_eq!(split_chat_line(START_NEW_MESSAGES), None);
    }
}
