use std::fmt;

use serde::{Deserialize, Serialize};

const PREFIX: &str = "session_";
const MAX_LEN: usize = 64;

/// Session identifier: `session_<unix millis>`.
///
/// Ids double as directory names, so parsed ids are restricted to ASCII
/// alphanumerics, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn from_millis(millis: u64) -> Self {
        Self(format!("{PREFIX}{millis}"))
    }

    /// Validate a client-supplied id.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_from_millis() {
        assert_eq!(
            SessionId::from_millis(1_700_000_000_123).as_str(),
            "session_1700000000123"
        );
    }

    #[test]
    fn parse_accepts_generated_ids() {
        let id = SessionId::from_millis(42);
        assert_eq!(SessionId::parse(id.as_str()), Some(id));
        assert_eq!(
            SessionId::parse(" my-phone_2 ").map(|s| s.to_string()),
            Some("my-phone_2".into())
        );
    }

    #[test]
    fn parse_rejects_path_like_ids() {
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("../etc").is_none());
        assert!(SessionId::parse("a/b").is_none());
        assert!(SessionId::parse(&"x".repeat(65)).is_none());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&SessionId::from_millis(7)).unwrap();
        assert_eq!(json, "\"session_7\"");
    }
}
