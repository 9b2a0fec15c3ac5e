//! # Chat Client Library
//!
//! Participants for the chat relay: an interactive terminal client for
//! humans and automated bots that answer what others write.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Connects to the relay, sends the identity frame and exchanges framed
//! messages. Kick notices from the server end the session.
//!
//! ### Terminal Module (`terminal`)
//! Prints every received frame and sends each typed line; `/exit` leaves.
//!
//! ### Classify Module (`classify`)
//! Tags a message (question, statement, weather, activity, join, ...) with
//! regular expressions and keyword tables.
//!
//! ### Persona and Bot Modules (`persona`, `bot`)
//! A [`persona::Persona`] is a set of JSON reply tables; a [`bot::ChatBot`]
//! decides which message to answer and asks its persona what to say.
//!
//! ### Weather Module (`weather`)
//! A [`weather::WeatherProvider`] backed by the MET Norway forecast API with
//! an on-disk cache, and a [`weather::WeatherBot`] that answers weather
//! questions from it.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::bot::{run_bot, ChatBot, Responder, RESPONSE_DELAY};
//! use client::persona::{Persona, PersonaKind};
//! use client::session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let persona = Persona::builtin(PersonaKind::Sport)?;
//!     let (reader, writer) = session::connect("127.0.0.1:2020", persona.name()).await?;
//!
//!     let exit = run_bot(reader, writer, ChatBot::new(persona), RESPONSE_DELAY).await?;
//!     println!("Bot stopped: {:?}", exit);
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod classify;
pub mod persona;
pub mod session;
pub mod terminal;
pub mod weather;
