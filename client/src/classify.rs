//! Lightweight pattern matching over received chat frames
//!
//! A frame is tagged by a fixed set of regular expressions and keyword
//! tables. Bots use the resulting [`MessageAnalysis`] to pick a reply; the
//! classification itself carries no opinion.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// A property detected in a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Question,
    Statement,
    Temperature,
    Weather,
    Location,
    Opinion,
    Join,
    Activity,
    Sport,
    Art,
    RequestActivity,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("The provided message is too complicated. I can only process one sentence.")]
    TooComplicated,
}

/// Tags of one message plus the details extracted while tagging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageAnalysis {
    pub tags: Vec<Tag>,
    /// First place mentioned after "in" or "at"
    pub location: Option<String>,
    /// Name from a join notice
    pub username: Option<String>,
    /// Last activity word found, lower case
    pub activity: Option<String>,
}

impl MessageAnalysis {
    pub fn has(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// True for temperature or weather talk
    pub fn is_about_weather(&self) -> bool {
        self.has(Tag::Temperature) || self.has(Tag::Weather)
    }

    fn push(&mut self, tag: Tag) {
        if !self.has(tag) {
            self.tags.push(tag);
        }
    }
}

static COMPLICATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r".*: .*[.?!:][A-Za-z0-9\s]+").expect("static pattern compiles")
});

static QUESTION_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:[Ww]hat|[Ww]here|[Ww]hen|[Ww]hy|[Ww]hich|[Ww]ho|[Hh]ow|[Ww]hose|[Cc]an you|[Cc]ould you|[Ii]s it|[Dd]o you|[Ww]ould you)\b",
    )
    .expect("static pattern compiles")
});

static JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"User (.*) has joined the chat!").expect("static pattern compiles")
});

static REQUEST_ACTIVITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[Ww]e could|[Ww]e should|[Cc]an we|[Cc]ould we")
        .expect("static pattern compiles")
});

static OPINION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[Dd]o you like|[Cc]an you rate|[Pp]lease rate|[Dd]o you think|[Hh]ow would you rate|What do you think about",
    )
    .expect("static pattern compiles")
});

/// Tried in order; "in" wins over "at"
static LOCATIONS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    ["[iI]n", "[aA]t"].map(|word| {
        Regex::new(&format!(r"\b{w} (.*)[\s!.?,]|\b{w} (.*)$", w = word))
            .expect("static pattern compiles")
    })
});

fn weather_subject(word: &str) -> Option<Tag> {
    match word {
        "temperature" | "hot" | "cold" => Some(Tag::Temperature),
        "weather" | "sunny" => Some(Tag::Weather),
        _ => None,
    }
}

fn activity_category(word: &str) -> Option<Tag> {
    match word {
        "sport" | "football" | "tennis" => Some(Tag::Sport),
        "art" | "draw" | "drawing" | "paint" | "painting" => Some(Tag::Art),
        _ => None,
    }
}

/// Tags `message`, a raw frame such as `Host: How is the weather in Berlin?`
///
/// Messages with more than one sentence are refused. A join notice is
/// tagged [`Tag::Join`] and nothing else.
pub fn classify(message: &str) -> Result<MessageAnalysis, ClassifyError> {
    if COMPLICATED.is_match(message) {
        return Err(ClassifyError::TooComplicated);
    }

    let mut analysis = MessageAnalysis::default();

    if let Some(caps) = JOIN.captures(message) {
        analysis.push(Tag::Join);
        analysis.username = caps.get(1).map(|m| m.as_str().to_string());
        return Ok(analysis);
    }

    if QUESTION_WORDS.is_match(message) {
        analysis.push(Tag::Question);
    } else {
        analysis.push(Tag::Statement);
    }

    for word in message
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
    {
        if let Some(tag) = weather_subject(&word) {
            analysis.push(tag);
        }
        if let Some(tag) = activity_category(&word) {
            analysis.push(tag);
            analysis.push(Tag::Activity);
            analysis.activity = Some(word);
        }
    }

    if analysis.has(Tag::Activity) && REQUEST_ACTIVITY.is_match(message) {
        analysis.push(Tag::RequestActivity);
    }

    if OPINION.is_match(message) {
        analysis.push(Tag::Opinion);
    }

    for pattern in LOCATIONS.iter() {
        if let Some(caps) = pattern.captures(message) {
            if let Some(place) = caps.get(1).or_else(|| caps.get(2)) {
                analysis.push(Tag::Location);
                analysis.location = Some(place.as_str().to_string());
                break;
            }
        }
    }

    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_complicated_message() {
        assert_eq!(
            classify("User: This is a test. Please treat this as a test."),
            Err(ClassifyError::TooComplicated)
        );
    }

    #[test]
    fn test_join_message_has_only_join_tag() {
        let analysis = classify("\nUser Testuser has joined the chat!").unwrap();

        assert_eq!(analysis.tags, vec![Tag::Join]);
        assert_eq!(analysis.username.as_deref(), Some("Testuser"));
    }

    #[test]
    fn test_weather_question_with_location() {
        let analysis = classify("\nHost: How is the weather in Berlin?").unwrap();

        assert!(analysis.has(Tag::Weather));
        assert!(analysis.has(Tag::Question));
        assert!(!analysis.has(Tag::Join));
        assert_eq!(analysis.location.as_deref(), Some("Berlin"));
    }

    #[test]
    fn test_statement_about_temperature() {
        let analysis = classify("\nUser: It is cold today!").unwrap();

        assert!(analysis.has(Tag::Statement));
        assert!(!analysis.has(Tag::Question));
        assert!(analysis.has(Tag::Temperature));
        assert!(!analysis.has(Tag::Location));
    }

    #[test]
    fn test_opinion_question_without_location() {
        let analysis = classify("\nHost: How would you rate the weather today?").unwrap();

        assert!(analysis.has(Tag::Opinion));
        assert!(analysis.has(Tag::Weather));
        assert!(analysis.has(Tag::Question));
        assert_eq!(analysis.location, None);
    }

    #[test]
    fn test_sunny_question_with_location() {
        let analysis = classify("\nUser: Is it sunny in Oslo?").unwrap();

        assert!(analysis.has(Tag::Question));
        assert!(analysis.has(Tag::Weather));
        assert_eq!(analysis.location.as_deref(), Some("Oslo"));
    }

    #[test]
    fn test_activity_request() {
        let analysis = classify("Alice: We could play tennis!").unwrap();

        assert!(analysis.has(Tag::Statement));
        assert!(analysis.has(Tag::Activity));
        assert!(analysis.has(Tag::Sport));
        assert!(analysis.has(Tag::RequestActivity));
        assert_eq!(analysis.activity.as_deref(), Some("tennis"));
    }

    #[test]
    fn test_request_phrase_needs_an_activity() {
        let analysis = classify("Alice: We could meet").unwrap();
        assert!(!analysis.has(Tag::RequestActivity));
    }

    #[test]
    fn test_art_opinion_question() {
        let analysis = classify("Bob: Do you like painting?").unwrap();

        assert!(analysis.has(Tag::Question));
        assert!(analysis.has(Tag::Opinion));
        assert!(analysis.has(Tag::Art));
        assert_eq!(analysis.activity.as_deref(), Some("painting"));
    }

    #[test]
    fn test_question_word_inside_other_word_is_ignored() {
        let analysis = classify("Bob: The show was great").unwrap();
        assert!(analysis.has(Tag::Statement));
    }
}
