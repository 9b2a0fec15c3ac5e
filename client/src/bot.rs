//! Automated participants
//!
//! A bot reads the chat like any other participant and answers at most once
//! per response delay, always to the latest message it is willing to answer.
//! Frames from other bots, leave notices, bot join notices and the history
//! separator are never answered, which keeps bots from talking to each other
//! forever.

use crate::classify::{classify, ClassifyError, MessageAnalysis, Tag};
use crate::session::{FrameReader, FrameWriter, Incoming, SessionError};
use async_trait::async_trait;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval, MissedTickBehavior};

/// Minimum time between two replies
pub const RESPONSE_DELAY: Duration = Duration::from_secs(1);

static REPLY_FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(.*[Bb]ot): |-+\[Start new messages\]-+|User .*[Bb]ot has joined the chat!|Host: User .* left the chat\.",
    )
    .expect("static pattern compiles")
});

/// What a bot can do with a chat message
#[async_trait]
pub trait Responder: Send + Sync {
    /// Display name used when connecting
    fn name(&self) -> &str;

    fn classify(&self, message: &str) -> Result<MessageAnalysis, ClassifyError> {
        classify(message)
    }

    /// Reply to a classified message that is not a join notice
    ///
    /// May wait on outside services; the bot keeps buffering frames meanwhile.
    async fn respond<R: Rng + ?Sized + Send>(
        &self,
        analysis: &MessageAnalysis,
        rng: &mut R,
    ) -> String;

    /// Reply to a join notice
    fn greet<R: Rng + ?Sized>(&self, username: &str, rng: &mut R) -> String;
}

/// Whether a bot may answer `frame` at all
pub fn is_answerable(frame: &str) -> bool {
    !REPLY_FILTER.is_match(frame)
}

/// Reply policy of one bot, independent of the connection
pub struct ChatBot<P> {
    responder: P,
    rng: StdRng,
    latest: Option<String>,
}

impl<P: Responder> ChatBot<P> {
    pub fn new(responder: P) -> Self {
        Self::with_rng(responder, StdRng::from_entropy())
    }

    pub fn with_rng(responder: P, rng: StdRng) -> Self {
        Self {
            responder,
            rng,
            latest: None,
        }
    }

    pub fn name(&self) -> &str {
        self.responder.name()
    }

    /// Remembers `frame` if it is answerable; older candidates are dropped
    pub fn observe(&mut self, frame: String) {
        if is_answerable(&frame) {
            self.latest = Some(frame);
        } else {
            debug!("{} ignores {:?}", self.responder.name(), frame);
        }
    }

    /// Produces the reply to the latest answerable frame, if any
    pub async fn take_reply(&mut self) -> Option<String> {
        let frame = self.latest.take()?;
        Some(self.reply_to(&frame).await)
    }

    async fn reply_to(&mut self, frame: &str) -> String {
        match self.responder.classify(frame) {
            Err(e) => e.to_string(),
            Ok(analysis) if analysis.has(Tag::Join) => {
                let username = analysis.username.as_deref().unwrap_or_default();
                self.responder.greet(username, &mut self.rng)
            }
            Ok(analysis) => self.responder.respond(&analysis, &mut self.rng).await,
        }
    }
}

/// Why a bot session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotExit {
    Kicked(String),
    Closed,
}

/// Runs a bot over an announced session until the server ends it
pub async fn run_bot<R, W, P>(
    mut reader: FrameReader<R>,
    mut writer: FrameWriter<W>,
    mut bot: ChatBot<P>,
    response_delay: Duration,
) -> Result<BotExit, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    P: Responder,
{
    let mut ticker = interval(response_delay);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            incoming = reader.next() => match incoming? {
                Incoming::Message(frame) => bot.observe(frame),
                Incoming::Kicked(reason) => {
                    info!("{} was kicked: {}", bot.name(), reason);
                    return Ok(BotExit::Kicked(reason));
                }
                Incoming::Closed => {
                    info!("Server closed the connection of {}", bot.name());
                    return Ok(BotExit::Closed);
                }
            },
            _ = ticker.tick() => {
                if let Some(reply) = bot.take_reply().await {
                    writer.send_chat(&reply).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{Persona, PersonaKind};
    use tokio_test::io::Builder;

    fn simple_bot() -> ChatBot<Persona> {
        ChatBot::with_rng(
            Persona::builtin(PersonaKind::Simple).unwrap(),
            StdRng::seed_from_u64(1),
        )
    }

    #[test]
    fn test_reply_filter() {
        assert!(!is_answerable("Sport_Bot: I could play tennis all day."));
        assert!(!is_answerable("------------[Start new messages]------------"));
        assert!(!is_answerable("User Art_Bot has joined the chat!"));
        assert!(!is_answerable("Host: User Bob left the chat."));
        assert!(is_answerable("User Bob has joined the chat!"));
        assert!(is_answerable("Host: What is your favourite sport?"));
    }

    #[tokio::test]
    async fn test_only_latest_message_is_answered() {
        let mut bot = simple_bot();
        bot.observe("Alice: It is cold today!".into());
        bot.observe("Bob: How is the weather in Berlin?".into());
        bot.observe("Art_Bot: I like all kinds of weather.".into());

        let reply = bot.take_reply().await.unwrap();
        assert!(bot.responder.weather.contains(&reply));
        assert_eq!(bot.take_reply().await, None);
    }

    #[tokio::test]
    async fn test_greets_joining_user() {
        let mut bot = simple_bot();
        bot.observe("User Carol has joined the chat!".into());

        let reply = bot.take_reply().await.unwrap();
        assert!(reply.contains("Carol"));
    }

    #[tokio::test]
    async fn test_complicated_message_gets_notice() {
        let mut bot = simple_bot();
        bot.observe("Alice: This is a test. Please treat this as a test.".into());

        assert_eq!(
            bot.take_reply().await.unwrap(),
            ClassifyError::TooComplicated.to_string()
        );
    }

    #[tokio::test]
    async fn test_run_bot_stops_when_kicked() {
        let reader = FrameReader::new(
            Builder::new()
                .read(b"Kicked by the host for no reason given::EOMsg::")
                .build(),
        );
        let writer = FrameWriter::new(Builder::new().build(), "Simple_Chat_Bot").unwrap();

        let exit = run_bot(reader, writer, simple_bot(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(exit, BotExit::Kicked("no reason given".into()));
    }
}
