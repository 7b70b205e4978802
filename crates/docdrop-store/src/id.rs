//! Blob identifiers.
//!
//! Identifiers are random 128-bit UUIDs rendered in lowercase hyphenated form.
//! The rendered text is the prefix of every stored filename.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Length of the rendered identifier text.
pub const ID_TEXT_LEN: usize = 36;

/// Opaque unique identifier of one stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(Uuid);

/// Client-supplied identifier text could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Malformed blob id: {0:?}")]
pub struct IdError(pub String);

impl BlobId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        BlobId(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if `file_name` is a stored name for this identifier:
    /// either `<id>` alone or `<id>.<ext>`.
    pub fn names(&self, file_name: &str) -> bool {
        let mut buf = Uuid::encode_buffer();
        let text = self.0.hyphenated().encode_lower(&mut buf);
        match file_name.strip_prefix(&*text) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }
}

impl From<Uuid> for BlobId {
    fn from(uuid: Uuid) -> Self {
        BlobId(uuid)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for BlobId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // Only the canonical hyphenated form names a file on disk.
        if trimmed.len() != ID_TEXT_LEN {
            return Err(IdError(s.to_string()));
        }
        Uuid::parse_str(trimmed)
            .map(BlobId)
            .map_err(|_| IdError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_unique() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(BlobId::generate()));
        }
    }

    #[test]
    fn test_display_is_lowercase_hyphenated() {
        let id = BlobId::generate();
        let text = id.to_string();
        assert_eq!(text.len(), ID_TEXT_LEN);
        assert_eq!(text, text.to_lowercase());
        assert_eq!(text.matches('-').count(), 4);
    }

    #[test]
    fn test_parse_round_trip() {
        let id = BlobId::generate();
        let parsed: BlobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_uppercase_accepted() {
        let id = BlobId::generate();
        let parsed: BlobId = id.to_string().to_uppercase().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<BlobId>().is_err());
        assert!("not-an-id".parse::<BlobId>().is_err());
        assert!("../../etc/passwd".parse::<BlobId>().is_err());
    }

    #[test]
    fn test_parse_rejects_simple_form() {
        let id = BlobId::generate();
        let simple = id.as_uuid().simple().to_string();
        assert!(simple.parse::<BlobId>().is_err());
    }

    #[test]
    fn test_names_matches_bare_and_extension() {
        let id = BlobId::generate();
        assert!(id.names(&id.to_string()));
        assert!(id.names(&format!("{}.docx", id)));
        assert!(id.names(&format!("{}.tar.gz", id)));
    }

    #[test]
    fn test_names_rejects_other_names() {
        let id = BlobId::generate();
        let other = BlobId::generate();
        assert!(!id.names(&format!("{}.docx", other)));
        assert!(!id.names(&format!(".{}.partial", id)));
        assert!(!id.names(&format!("{}x.docx", id)));
        assert!(!id.names(""));
    }

    #[test]
    fn test_serde_transparent() {
        let id = BlobId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
