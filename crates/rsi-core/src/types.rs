//! Core types for RSI
//!
//! Shared primitives used across the engine:
//! - Timestamps
//! - Identifiers
//! - Content fingerprints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Create a timestamp for the current moment
pub fn now() -> Timestamp {
    Utc::now()
}

/// Generate a new random identifier with a readable prefix (`err-…`, `fix-…`)
pub fn new_id(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..12])
}

/// Blake3 fingerprint of a file's content, used to confirm reverts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint arbitrary bytes
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Fingerprint used for files that do not exist
    pub fn absent() -> Self {
        Self([0u8; 32])
    }

    /// Fingerprint a file's current content, or [`absent`](Self::absent)
    /// when it cannot be read
    pub async fn of_file(path: &std::path::Path) -> Self {
        match tokio::fs::read(path).await {
            Ok(bytes) => Self::of(&bytes),
            Err(_) => Self::absent(),
        }
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix_and_are_unique() {
        let a = new_id("err");
        let b = new_id("err");
        assert!(a.starts_with("err-"));
        assert_eq!(a.len(), "err-".len() + 12);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_tracks_content() {
        assert_eq!(Fingerprint::of(b"abc"), Fingerprint::of(b"abc"));
        assert_ne!(Fingerprint::of(b"abc"), Fingerprint::of(b"abd"));
        assert_ne!(Fingerprint::of(b""), Fingerprint::absent());
        assert_eq!(Fingerprint::of(b"abc").to_hex().len(), 64);
    }
}
