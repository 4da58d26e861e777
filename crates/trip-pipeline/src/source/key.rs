//! Source key parsing
//!
//! Keys look like `<prefix>:<trip_id>:<YYYYMMDD>:<role>`. Nothing else is
//! accepted; in particular the legacy `<prefix>:<trip_id>:<role>` layout
//! without a date is rejected rather than guessed at.

use std::fmt;
use std::str::FromStr;

use trip_common::types::KEY_DELIMITER;
use trip_common::TripIdentity;

use crate::error::{PipelineError, PipelineResult};

const SEGMENTS: usize = 4;

/// What a key points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// Hash (or JSON string) with the trip summary
    Completion,
    /// Stream of position samples
    Track,
}

impl KeyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::Completion => "completion",
            KeyRole::Track => "track",
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completion" => Ok(KeyRole::Completion),
            "track" => Ok(KeyRole::Track),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A parsed source key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TripKey {
    pub identity: TripIdentity,
    pub role: KeyRole,
}

/// Parses and formats keys for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_KEY_PREFIX)
    }
}

impl KeyLayout {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn parse(&self, raw: &str) -> PipelineResult<TripKey> {
        let segments: Vec<&str> = raw.split(KEY_DELIMITER).collect();
        if segments.len() != SEGMENTS {
            return Err(PipelineError::malformed_key(
                raw,
                format!("expected {} segments, got {}", SEGMENTS, segments.len()),
            ));
        }

        if segments[0] != self.prefix {
            return Err(PipelineError::malformed_key(
                raw,
                format!("prefix '{}' is not '{}'", segments[0], self.prefix),
            ));
        }

        let role: KeyRole = segments[3]
            .parse()
            .map_err(|reason: String| PipelineError::malformed_key(raw, reason))?;

        let identity = TripIdentity::new(segments[1], segments[2])
            .map_err(|e| PipelineError::malformed_key(raw, e.to_string()))?;

        Ok(TripKey { identity, role })
    }

    /// Parse a key and insist it is a completion key.
    pub fn parse_completion(&self, raw: &str) -> PipelineResult<TripIdentity> {
        let key = self.parse(raw)?;
        match key.role {
            KeyRole::Completion => Ok(key.identity),
            other => Err(PipelineError::malformed_key(
                raw,
                format!("expected a completion key, found role '{}'", other),
            )),
        }
    }

    pub fn format(&self, identity: &TripIdentity, role: KeyRole) -> String {
        format!(
            "{prefix}{d}{trip}{d}{date}{d}{role}",
            prefix = self.prefix,
            trip = identity.trip_id(),
            date = identity.start_date(),
            role = role,
            d = KEY_DELIMITER,
        )
    }

    /// Companion status key removed together with the trip on purge.
    pub fn status_key(&self, identity: &TripIdentity) -> String {
        format!(
            "{prefix}{d}{trip}{d}{date}{d}status",
            prefix = self.prefix,
            trip = identity.trip_id(),
            date = identity.start_date(),
            d = KEY_DELIMITER,
        )
    }

    /// Glob matching every completion key.
    pub fn completion_pattern(&self) -> String {
        format!("{}{d}*{d}*{d}completion", self.prefix, d = KEY_DELIMITER)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_completion_key() {
        let layout = KeyLayout::default();
        let key = layout.parse("trip:21520:20250901:completion").unwrap();
        assert_eq!(key.identity.trip_id(), "21520");
        assert_eq!(key.identity.start_date(), "20250901");
        assert_eq!(key.role, KeyRole::Completion);
    }

    #[test]
    fn test_parse_track_key() {
        let key = KeyLayout::default().parse("trip:7:20240229:track").unwrap();
        assert_eq!(key.role, KeyRole::Track);
    }

    #[test]
    fn test_legacy_key_without_date_is_malformed() {
        let err = KeyLayout::default().parse("trip:21520:completion").unwrap_err();
        assert_eq!(err.kind(), "malformed_key");
    }

    #[test]
    fn test_rejects_wrong_prefix_role_and_date() {
        let layout = KeyLayout::default();
        for raw in [
            "ride:21520:20250901:completion",
            "trip:21520:20250901:summary",
            "trip:21520:2025-09-01:completion",
            "trip::20250901:completion",
            "trip:21520:20250901:completion:extra",
            "",
        ] {
            assert!(layout.parse(raw).is_err(), "accepted {raw}");
        }
    }

    #[test]
    fn test_path_like_trip_id_is_malformed() {
        let layout = KeyLayout::default();
        for raw in [
            "trip:route/7:20250901:completion",
            "trip:..:20250901:completion",
            "trip:a\\b:20250901:track",
        ] {
            let err = layout.parse(raw).unwrap_err();
            assert_eq!(err.kind(), "malformed_key", "{raw}");
        }
    }

    #[test]
    fn test_parse_completion_rejects_track() {
        let layout = KeyLayout::default();
        assert!(layout.parse_completion("trip:1:20250901:track").is_err());
        assert!(layout.parse_completion("trip:1:20250901:completion").is_ok());
    }

    #[test]
    fn test_custom_prefix_and_pattern() {
        let layout = KeyLayout::new("fleet");
        assert_eq!(layout.completion_pattern(), "fleet:*:*:completion");
        assert!(layout.parse("fleet:9:20250101:track").is_ok());
        assert!(layout.parse("trip:9:20250101:track").is_err());

        let id = TripIdentity::new("9", "20250101").unwrap();
        assert_eq!(layout.status_key(&id), "fleet:9:20250101:status");
    }

    proptest! {
        #[test]
        fn prop_format_then_parse_round_trips(
            trip in "[A-Za-z0-9_-]{1,24}",
            date in "[0-9]{8}",
            track in any::<bool>(),
        ) {
            let layout = KeyLayout::default();
            let identity = TripIdentity::new(trip, date).unwrap();
            let role = if track { KeyRole::Track } else { KeyRole::Completion };

            let raw = layout.format(&identity, role);
            let parsed = layout.parse(&raw).unwrap();

            prop_assert_eq!(&parsed.identity, &identity);
            prop_assert_eq!(parsed.role, role);
            prop_assert_eq!(layout.format(&parsed.identity, parsed.role), raw);
        }
    }
}
