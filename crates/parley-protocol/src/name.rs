//! Participant display names.

use std::fmt;

use thiserror::Error;

/// Display name chosen by a participant during the handshake.
///
/// Names are not unique and are kept exactly as submitted; the only rule is
/// that they contain something other than whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantName(String);

impl ParticipantName {
    /// Validates a candidate name read from the handshake line.
    pub fn new(raw: impl Into<String>) -> Result<Self, NameError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(NameError::Blank);
        }
        Ok(Self(raw))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ParticipantName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reasons a handshake name is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("Name is empty or whitespace")]
    Blank,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_names_rejected() {
        assert_eq!(ParticipantName::new(""), Err(NameError::Blank));
        assert_eq!(ParticipantName::new("   "), Err(NameError::Blank));
        assert_eq!(ParticipantName::new("\t"), Err(NameError::Blank));
    }

    #[test]
    fn test_name_kept_verbatim() {
        let name = ParticipantName::new(" alice ").unwrap();
        assert_eq!(name.as_str(), " alice ");
        assert_eq!(name.to_string(), " alice ");
    }
}
