//! Error event types and subscription filters.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::id::generate_id;

/// Classification of a reported game error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// A player command failed (bad input, rejected action).
    Command,
    /// A platform component failed (container crash, scheduling fault).
    System,
    /// Anything that fits neither of the above.
    General,
}

/// An error event published to subscribers.
///
/// Errors without a `match_id` are global; errors with a `match_id` but a
/// `player_id` of 0 (or none) are match-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameError {
    /// Unique id for this event.
    pub id: String,

    /// When the error was raised.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    /// Match this error belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,

    /// Player this error belongs to. 0 means match-wide.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<u64>,

    /// Error classification.
    #[serde(rename = "type")]
    pub kind: ErrorKind,

    /// Component that raised the error (e.g. "scheduler", "container").
    pub source: String,

    /// Human-readable message.
    pub message: String,

    /// Structured extra context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl GameError {
    /// Creates a new error event stamped with the given time.
    #[must_use]
    pub fn new(
        kind: ErrorKind,
        source: impl Into<String>,
        message: impl Into<String>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            id: generate_id(),
            timestamp,
            match_id: None,
            player_id: None,
            kind,
            source: source.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Scopes the error to a match.
    #[must_use]
    pub fn with_match(mut self, match_id: impl Into<String>) -> Self {
        self.match_id = Some(match_id.into());
        self
    }

    /// Scopes the error to a player within its match.
    #[must_use]
    pub fn with_player(mut self, player_id: u64) -> Self {
        self.player_id = Some(player_id);
        self
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Subscription filter over error events.
///
/// A filter with no `match_id` matches every event. A match-scoped filter
/// matches events for that match plus global events (no match id). A
/// player-scoped filter additionally requires the event's player id to equal
/// the subscriber's, or to be absent/0 (match-wide).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFilter {
    /// Match to filter on; `None` matches everything.
    pub match_id: Option<String>,
    /// Player to filter on; only meaningful together with `match_id`.
    pub player_id: Option<u64>,
}

impl ErrorFilter {
    /// Filter that matches every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter scoped to one match.
    #[must_use]
    pub fn for_match(match_id: impl Into<String>) -> Self {
        Self {
            match_id: Some(match_id.into()),
            player_id: None,
        }
    }

    /// Filter scoped to one player in one match.
    #[must_use]
    pub fn for_player(match_id: impl Into<String>, player_id: u64) -> Self {
        Self {
            match_id: Some(match_id.into()),
            player_id: Some(player_id),
        }
    }

    /// Returns `true` if `error` passes this filter.
    #[must_use]
    pub fn matches(&self, error: &GameError) -> bool {
        let Some(wanted_match) = &self.match_id else {
            return true;
        };

        // Global errors (no match id) reach match-scoped subscribers too.
        if let Some(event_match) = &error.match_id
            && event_match != wanted_match
        {
            return false;
        }

        let Some(wanted_player) = self.player_id else {
            return true;
        };

        // player 0 (or absent) is match-wide and reaches every player.
        match error.player_id {
            None | Some(0) => true,
            Some(p) => p == wanted_player,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(match_id: Option<&str>, player_id: Option<u64>) -> GameError {
        let mut e = GameError::new(
            ErrorKind::System,
            "test",
            "boom",
            OffsetDateTime::UNIX_EPOCH,
        );
        e.match_id = match_id.map(String::from);
        e.player_id = player_id;
        e
    }

    #[test]
    fn test_unfiltered_matches_everything() {
        let filter = ErrorFilter::all();
        assert!(filter.matches(&event(None, None)));
        assert!(filter.matches(&event(Some("m1"), Some(7))));
    }

    #[test]
    fn test_match_filter() {
        let filter = ErrorFilter::for_match("m1");
        assert!(filter.matches(&event(Some("m1"), None)));
        assert!(filter.matches(&event(None, None)), "global errors pass");
        assert!(!filter.matches(&event(Some("m2"), None)));
    }

    #[test]
    fn test_player_filter() {
        let filter = ErrorFilter::for_player("m1", 7);
        assert!(filter.matches(&event(Some("m1"), Some(7))));
        assert!(filter.matches(&event(Some("m1"), Some(0))), "match-wide");
        assert!(filter.matches(&event(Some("m1"), None)), "match-wide");
        assert!(!filter.matches(&event(Some("m1"), Some(8))));
        assert!(!filter.matches(&event(Some("m2"), Some(7))));
    }

    #[test]
    fn test_error_builder() {
        let e = GameError::new(
            ErrorKind::Command,
            "engine",
            "bad move",
            OffsetDateTime::UNIX_EPOCH,
        )
        .with_match("m1")
        .with_player(3)
        .with_details(serde_json::json!({"command": "move"}));

        assert_eq!(e.match_id.as_deref(), Some("m1"));
        assert_eq!(e.player_id, Some(3));
        assert!(e.details.is_some());
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let e = GameError::new(
            ErrorKind::General,
            "test",
            "x",
            OffsetDateTime::UNIX_EPOCH,
        );
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains(r#""type":"GENERAL""#));
        assert!(!json.contains("matchId"));
        assert!(!json.contains("details"));
    }
}
