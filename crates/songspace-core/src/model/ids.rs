use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CorpusError;

/// Stable identifier for a track (e.g. an Echo Nest `TR...` id).
///
/// Always non-empty and trimmed. Ordering is lexical, which is what the
/// index uses to break distance ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackId(String);

impl TrackId {
    /// Create a track id, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns `CorpusError::InvalidId` if the trimmed id is empty.
    pub fn new(id: impl AsRef<str>) -> Result<Self, CorpusError> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(CorpusError::InvalidId(id.as_ref().to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TrackId {
    type Error = CorpusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TrackId> for String {
    fn from(id: TrackId) -> Self {
        id.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl AsRef<str> for TrackId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_trims() {
        let id = TrackId::new("  TRAAAAW128F429D538 ").unwrap();
        assert_eq!(id.as_str(), "TRAAAAW128F429D538");
    }

    #[test]
    fn test_track_id_rejects_blank() {
        assert!(TrackId::new("").is_err());
        assert!(TrackId::new("   ").is_err());
    }

    #[test]
    fn test_track_id_ordering_is_lexical() {
        let a = TrackId::new("A").unwrap();
        let b = TrackId::new("B").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_track_id_serde() {
        let id = TrackId::new("TR1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"TR1\"");
        assert!(serde_json::from_str::<TrackId>("\"  \"").is_err());
    }
}
