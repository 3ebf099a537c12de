//! Voice phrase routing.
//!
//! Recognised speech is checked against a small set of control phrases before
//! it is treated as an intent. Matching is resilient to the punctuation and
//! casing speech recognisers insert.
//!
//! # Supported Phrases
//!
//! | Phrase | Command |
//! |--------|---------|
//! | "ghost", "ghost start", "hey ghost", "hey ghosty" | `Wake` |
//! | "ghost stop", "bye ghost", "bye ghosty" | `Retreat` |
//! | "ghost status" | `Status` |
//! | anything else | `Intent` |

/// A command derived from one recognised utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechCommand {
    /// Toggle the assistant into view.
    Wake,
    /// Send the assistant away.
    Retreat,
    /// Report the configured status message.
    Status,
    /// Forward the original text as an intent.
    Intent(String),
    /// Nothing recognisable was said.
    Empty,
}

const WAKE_PHRASES: &[&str] = &["ghost", "ghost start", "hey ghost", "hey ghosty"];
const RETREAT_PHRASES: &[&str] = &["ghost stop", "bye ghost", "bye ghosty"];
const STATUS_PHRASES: &[&str] = &["ghost status"];

/// Route one utterance.
#[must_use]
pub fn parse_phrase(text: &str) -> SpeechCommand {
    let clean = strip_punctuation(&text.to_lowercase());
    if clean.is_empty() {
        return SpeechCommand::Empty;
    }
    if WAKE_PHRASES.contains(&clean.as_str()) {
        SpeechCommand::Wake
    } else if RETREAT_PHRASES.contains(&clean.as_str()) {
        SpeechCommand::Retreat
    } else if STATUS_PHRASES.contains(&clean.as_str()) {
        SpeechCommand::Status
    } else {
        SpeechCommand::Intent(text.trim().to_owned())
    }
}

/// Drop punctuation and collapse whitespace, so "Hey, Ghost!" → "hey ghost".
fn strip_punctuation(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
