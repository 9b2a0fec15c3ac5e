//! Live weather for chat bots
//!
//! [`MetClient`] looks a city up in a [`CityTable`], fetches the compact
//! location forecast from MET Norway and keeps the answer on disk until the
//! `Expires` header of the response has passed. [`WeatherBot`] turns
//! weather questions into reports and hands everything else to its persona.

use crate::bot::Responder;
use crate::classify::{MessageAnalysis, Tag};
use crate::persona::Persona;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const FORECAST_URL: &str = "https://api.met.no/weatherapi/locationforecast/2.0/compact";
/// Appended to every report
pub const ATTRIBUTION: &str = "This information is based on weather data from MET Norway.";

const USER_AGENT: &str = concat!("chat-relay-weather-bot/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Cache lifetime when the response carries no usable `Expires` header
const DEFAULT_TTL_SECS: i64 = 30 * 60;
const ABSOLUTE_ZERO: f64 = -273.15;

const UNKNOWN_LOCATION: [&str; 2] = [
    "Please name a known city!",
    "What city are you referring to?",
];
const UNREACHABLE_REPLY: &str =
    "I am unable to reach the weather service. Could you please make sure I have access to the Internet?";

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("unknown city {0:?}")]
    UnknownCity(String),
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("the forecast has no usable current data")]
    MissingData,
    #[error("weather file error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid weather data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Conditions for the coming hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Degrees Celsius
    pub air_temperature: f64,
    /// Percent of the sky covered, 0 to 100
    pub cloud_area_fraction: f64,
}

impl Observation {
    pub fn sky(&self) -> &'static str {
        match self.cloud_area_fraction {
            f if f < 25.0 => "clear",
            f if f < 50.0 => "partly cloudy",
            f if f < 75.0 => "cloudy",
            _ => "very cloudy",
        }
    }

    pub fn feel(&self) -> &'static str {
        match self.air_temperature {
            t if t > 20.0 => "hot",
            t if t > 10.0 => "not cold",
            t if t < 0.0 => "very cold",
            _ => "cold",
        }
    }

    /// Warm and nearly cloudless
    pub fn is_pleasant(&self) -> bool {
        self.air_temperature > 15.0 && self.cloud_area_fraction < 10.0
    }
}

/// Source of current weather by city name
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, city: &str) -> Result<Observation, WeatherError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

const BUILTIN_CITIES: &[(&str, f64, f64)] = &[
    ("Oslo", 59.9139, 10.7522),
    ("Bergen", 60.3913, 5.3221),
    ("Trondheim", 63.4305, 10.3951),
    ("Stavanger", 58.9700, 5.7331),
    ("Tromsø", 69.6492, 18.9553),
    ("Stockholm", 59.3293, 18.0686),
    ("Copenhagen", 55.6761, 12.5683),
    ("Helsinki", 60.1699, 24.9384),
    ("Berlin", 52.5200, 13.4050),
    ("London", 51.5072, -0.1276),
    ("Paris", 48.8566, 2.3522),
    ("Madrid", 40.4168, -3.7038),
    ("Rome", 41.9028, 12.4964),
    ("New York", 40.7128, -74.0060),
    ("Tokyo", 35.6762, 139.6503),
];

/// City name to coordinates, matched case-insensitively
#[derive(Debug, Clone)]
pub struct CityTable {
    cities: HashMap<String, Coordinates>,
}

impl Default for CityTable {
    fn default() -> Self {
        let cities = BUILTIN_CITIES
            .iter()
            .map(|&(name, lat, lon)| (name.to_lowercase(), Coordinates { lat, lon }))
            .collect();
        Self { cities }
    }
}

impl CityTable {
    /// Built-in cities plus those in a JSON object of
    /// `{"City": {"lat": .., "lon": ..}}`
    pub fn with_file(path: &Path) -> Result<Self, WeatherError> {
        let extra: HashMap<String, Coordinates> =
            serde_json::from_str(&fs::read_to_string(path)?)?;
        let mut table = Self::default();
        for (name, coordinates) in extra {
            table.cities.insert(name.to_lowercase(), coordinates);
        }
        Ok(table)
    }

    pub fn lookup(&self, city: &str) -> Option<Coordinates> {
        self.cities.get(&city.trim().to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct Forecast {
    properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    timeseries: Vec<TimeStep>,
}

#[derive(Debug, Deserialize)]
struct TimeStep {
    data: TimeStepData,
}

#[derive(Debug, Deserialize)]
struct TimeStepData {
    instant: InstantData,
}

#[derive(Debug, Deserialize)]
struct InstantData {
    details: InstantDetails,
}

#[derive(Debug, Deserialize)]
struct InstantDetails {
    air_temperature: Option<f64>,
    cloud_area_fraction: Option<f64>,
}

impl TryFrom<Forecast> for Observation {
    type Error = WeatherError;

    fn try_from(forecast: Forecast) -> Result<Self, Self::Error> {
        let details = &forecast
            .properties
            .timeseries
            .first()
            .ok_or(WeatherError::MissingData)?
            .data
            .instant
            .details;

        match (details.air_temperature, details.cloud_area_fraction) {
            (Some(air_temperature), Some(cloud_area_fraction))
                if air_temperature >= ABSOLUTE_ZERO
                    && (0.0..=100.0).contains(&cloud_area_fraction) =>
            {
                Ok(Observation {
                    air_temperature,
                    cloud_area_fraction,
                })
            }
            _ => Err(WeatherError::MissingData),
        }
    }
}

/// Parses an HTTP date such as `Sat, 05 Mar 2022 17:11:58 GMT`
pub fn parse_expires(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    city: String,
    expires_at: i64,
    observation: Observation,
}

/// One JSON file per city
#[derive(Debug, Clone)]
pub struct ForecastCache {
    dir: PathBuf,
}

impl ForecastCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, city: &str) -> PathBuf {
        let key: String = city
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("weather_{}.json", key))
    }

    /// The cached observation for `city` unless missing, unreadable or expired
    pub fn load(&self, city: &str, now: DateTime<Utc>) -> Option<Observation> {
        let contents = fs::read_to_string(self.path(city)).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&contents) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring corrupt weather cache for {}: {}", city, e);
                return None;
            }
        };
        (entry.expires_at > now.timestamp()).then_some(entry.observation)
    }

    pub fn store(
        &self,
        city: &str,
        observation: Observation,
        expires: DateTime<Utc>,
    ) -> Result<(), WeatherError> {
        fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            city: city.trim().to_string(),
            expires_at: expires.timestamp(),
            observation,
        };
        fs::write(self.path(city), serde_json::to_string(&entry)?)?;
        Ok(())
    }
}

/// [`WeatherProvider`] backed by the MET Norway locationforecast API
pub struct MetClient {
    http: reqwest::Client,
    cities: CityTable,
    cache: ForecastCache,
}

impl MetClient {
    pub fn new(cities: CityTable, cache_dir: impl Into<PathBuf>) -> Result<Self, WeatherError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            cities,
            cache: ForecastCache::new(cache_dir),
        })
    }

    async fn fetch(
        &self,
        coordinates: Coordinates,
    ) -> Result<(Observation, DateTime<Utc>), WeatherError> {
        let url = format!(
            "{}?lat={:.4}&lon={:.4}",
            FORECAST_URL, coordinates.lat, coordinates.lon
        );
        let response = self.http.get(&url).send().await?.error_for_status()?;

        let expires = response
            .headers()
            .get(reqwest::header::EXPIRES)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_expires)
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(DEFAULT_TTL_SECS));
        let forecast: Forecast = response.json().await?;

        Ok((Observation::try_from(forecast)?, expires))
    }
}

#[async_trait]
impl WeatherProvider for MetClient {
    async fn current(&self, city: &str) -> Result<Observation, WeatherError> {
        let coordinates = self
            .cities
            .lookup(city)
            .ok_or_else(|| WeatherError::UnknownCity(city.to_string()))?;

        if let Some(observation) = self.cache.load(city, Utc::now()) {
            debug!("Weather for {} served from cache", city);
            return Ok(observation);
        }

        let (observation, expires) = self.fetch(coordinates).await?;
        info!("Fetched weather for {}: {:?}", city, observation);
        if let Err(e) = self.cache.store(city, observation, expires) {
            warn!("Failed to cache weather for {}: {}", city, e);
        }
        Ok(observation)
    }
}

/// Bot that answers weather questions with live data
pub struct WeatherBot<W> {
    persona: Persona,
    provider: W,
}

impl<W: WeatherProvider> WeatherBot<W> {
    pub fn new(persona: Persona, provider: W) -> Self {
        Self { persona, provider }
    }
}

fn unknown_location<R: Rng + ?Sized>(rng: &mut R) -> String {
    UNKNOWN_LOCATION
        .choose(rng)
        .copied()
        .unwrap_or(UNKNOWN_LOCATION[0])
        .to_string()
}

#[async_trait]
impl<W: WeatherProvider> Responder for WeatherBot<W> {
    fn name(&self) -> &str {
        &self.persona.name
    }

    async fn respond<R: Rng + ?Sized + Send>(
        &self,
        analysis: &MessageAnalysis,
        rng: &mut R,
    ) -> String {
        if !analysis.has(Tag::Question) || !analysis.is_about_weather() {
            return self.persona.respond(analysis, rng).await;
        }
        let Some(city) = analysis.location.as_deref() else {
            return unknown_location(rng);
        };

        let observation = match self.provider.current(city).await {
            Ok(observation) => observation,
            Err(WeatherError::UnknownCity(_)) => return unknown_location(rng),
            Err(e) => {
                warn!("Weather lookup for {} failed: {}", city, e);
                return UNREACHABLE_REPLY.to_string();
            }
        };

        let report = if analysis.has(Tag::Opinion) {
            let verdict = if observation.is_pleasant() {
                "I like it!"
            } else {
                "I do not like it!"
            };
            format!(
                "The weather in {} is {} and {}. {}",
                city,
                observation.sky(),
                observation.feel(),
                verdict
            )
        } else if analysis.has(Tag::Temperature) {
            format!(
                "The temperature in {} is {:.1} degrees Celsius!",
                city, observation.air_temperature
            )
        } else {
            format!(
                "The temperature in {} is {:.1} degrees Celsius! The sky is {}.",
                city,
                observation.air_temperature,
                observation.sky()
            )
        };
        format!("{} {}", report, ATTRIBUTION)
    }

    fn greet<R: Rng + ?Sized>(&self, username: &str, rng: &mut R) -> String {
        self.persona.greet(username, rng)
    }
}
