//! Data-driven reply tables for chat bots

use crate::bot::Responder;
use crate::classify::{MessageAnalysis, Tag};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Said when no table has anything to offer
const FALLBACK_REPLY: &str = "I am not sure if I understand your message.";

const SIMPLE: &str = include_str!("../personas/simple.json");
const SPORT: &str = include_str!("../personas/sport.json");
const ART: &str = include_str!("../personas/art.json");
const WEATHER: &str = include_str!("../personas/weather.json");

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("failed to read persona file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid persona definition: {0}")]
    Json(#[from] serde_json::Error),
}

/// Built-in personas
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PersonaKind {
    Simple,
    Sport,
    Art,
    /// Answers weather questions with live forecasts
    Weather,
}

/// Reply tables of one bot
///
/// Every table is optional. When the most specific table for a message is
/// missing or empty the next more general one is used, ending with
/// `general`. Activity opinions may contain `{}`, replaced by the activity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Persona {
    pub name: String,
    #[serde(default)]
    pub greetings: Vec<String>,
    #[serde(default)]
    pub opinion: Vec<String>,
    #[serde(default)]
    pub question: Vec<String>,
    #[serde(default)]
    pub statement: Vec<String>,
    #[serde(default)]
    pub weather: Vec<String>,
    #[serde(default)]
    pub weather_opinion: Vec<String>,
    #[serde(default)]
    pub location: Vec<String>,
    #[serde(default)]
    pub general: Vec<String>,
    /// Replies keyed by activity word
    #[serde(default)]
    pub activity_replies: HashMap<String, Vec<String>>,
    /// Opinions keyed by activity word or by category (`sport`, `art`)
    #[serde(default)]
    pub activity_opinions: HashMap<String, Vec<String>>,
}

impl Persona {
    pub fn builtin(kind: PersonaKind) -> Result<Self, PersonaError> {
        let source = match kind {
            PersonaKind::Simple => SIMPLE,
            PersonaKind::Sport => SPORT,
            PersonaKind::Art => ART,
            PersonaKind::Weather => WEATHER,
        };
        Ok(serde_json::from_str(source)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, PersonaError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn activity_opinion<R: Rng + ?Sized>(
        &self,
        analysis: &MessageAnalysis,
        activity: &str,
        rng: &mut R,
    ) -> Option<String> {
        let category = if analysis.has(Tag::Sport) {
            "sport"
        } else {
            "art"
        };
        let table = self
            .activity_opinions
            .get(activity)
            .or_else(|| self.activity_opinions.get(category))?;
        pick(table, rng).map(|opinion| opinion.replace("{}", activity))
    }

    fn activity_reply<R: Rng + ?Sized>(&self, activity: &str, rng: &mut R) -> Option<String> {
        self.activity_replies
            .get(activity)
            .and_then(|table| pick_owned(table, rng))
    }
}

/// Drawing activities share one set of replies
pub fn normalize_activity(word: &str) -> &str {
    match word {
        "draw" | "paint" | "painting" => "drawing",
        other => other,
    }
}

fn pick<'a, R: Rng + ?Sized>(table: &'a [String], rng: &mut R) -> Option<&'a str> {
    table.choose(rng).map(String::as_str)
}

fn pick_owned<R: Rng + ?Sized>(table: &[String], rng: &mut R) -> Option<String> {
    pick(table, rng).map(str::to_string)
}

#[async_trait]
impl Responder for Persona {
    fn name(&self) -> &str {
        &self.name
    }

    async fn respond<R: Rng + ?Sized + Send>(
        &self,
        analysis: &MessageAnalysis,
        rng: &mut R,
    ) -> String {
        let activity = analysis.activity.as_deref().map(normalize_activity);
        let mut reply = None;

        if analysis.has(Tag::Question) {
            if analysis.has(Tag::Opinion) {
                if let Some(activity) = activity {
                    reply = self.activity_opinion(analysis, activity, rng);
                }
                if reply.is_none() && analysis.is_about_weather() {
                    reply = pick_owned(&self.weather_opinion, rng);
                }
                if reply.is_none() {
                    reply = pick_owned(&self.opinion, rng);
                }
            } else if analysis.is_about_weather() {
                reply = pick_owned(&self.weather, rng);
            } else if let Some(activity) = activity {
                reply = self.activity_reply(activity, rng);
            } else if analysis.has(Tag::Location) {
                reply = pick_owned(&self.location, rng);
            }
            if reply.is_none() {
                reply = pick_owned(&self.question, rng);
            }
        } else {
            if let (true, Some(activity)) = (analysis.has(Tag::RequestActivity), activity) {
                reply = self.activity_reply(activity, rng);
            }
            if reply.is_none() {
                reply = pick_owned(&self.statement, rng);
            }
        }

        reply
            .or_else(|| pick_owned(&self.general, rng))
            .unwrap_or_else(|| FALLBACK_REPLY.to_string())
    }

    fn greet<R: Rng + ?Sized>(&self, username: &str, rng: &mut R) -> String {
        let greeting = pick(&self.greetings, rng).unwrap_or("Hello");
        let ending = ["!", ".", ""].choose(rng).copied().unwrap_or("!");
        format!("{} {}{}", greeting, username, ending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    async fn reply(persona: &Persona, message: &str) -> String {
        persona.respond(&classify(message).unwrap(), &mut rng()).await
    }

    #[test]
    fn test_builtin_personas_load() {
        for kind in [
            PersonaKind::Simple,
            PersonaKind::Sport,
            PersonaKind::Art,
            PersonaKind::Weather,
        ] {
            let persona = Persona::builtin(kind).unwrap();
            assert!(persona.name.ends_with("Bot"));
            assert!(!persona.greetings.is_empty());
        }
    }

    #[tokio::test]
    async fn test_sport_opinion_mentions_activity() {
        let sport = Persona::builtin(PersonaKind::Sport).unwrap();
        let answer = reply(&sport, "Alice: Do you like football?").await;

        assert!(answer.contains("football"), "{}", answer);
    }

    #[tokio::test]
    async fn test_art_request_uses_drawing_replies() {
        let art = Persona::builtin(PersonaKind::Art).unwrap();
        let answer = reply(&art, "Alice: We could paint together!").await;

        assert!(art.activity_replies["drawing"].contains(&answer));
    }

    #[tokio::test]
    async fn test_simple_weather_question() {
        let simple = Persona::builtin(PersonaKind::Simple).unwrap();
        let answer = reply(&simple, "Host: How is the weather in Berlin?").await;

        assert!(simple.weather.contains(&answer));
    }

    #[tokio::test]
    async fn test_simple_opinion_ignores_activity() {
        let simple = Persona::builtin(PersonaKind::Simple).unwrap();
        let answer = reply(&simple, "Alice: Do you like tennis?").await;

        assert!(simple.opinion.contains(&answer));
    }

    #[tokio::test]
    async fn test_statement_reply() {
        let art = Persona::builtin(PersonaKind::Art).unwrap();
        let answer = reply(&art, "Bob: It is cold today!").await;

        assert!(art.statement.contains(&answer));
    }

    #[tokio::test]
    async fn test_empty_persona_falls_back() {
        let persona = Persona {
            name: "Quiet_Bot".into(),
            ..Persona::default()
        };

        assert_eq!(reply(&persona, "Bob: Hello").await, FALLBACK_REPLY);
        assert!(persona.greet("Bob", &mut rng()).starts_with("Hello Bob"));
    }

    #[tokio::test]
    async fn test_persona_from_json() {
        let persona: Persona =
            serde_json::from_str(r#"{"name": "Echo_Bot", "statement": ["Indeed."]}"#).unwrap();

        assert_eq!(reply(&persona, "Bob: Nice day").await, "Indeed.");
    }

    #[test]
    fn test_normalize_activity() {
        assert_eq!(normalize_activity("paint"), "drawing");
        assert_eq!(normalize_activity("tennis"), "tennis");
    }
}
