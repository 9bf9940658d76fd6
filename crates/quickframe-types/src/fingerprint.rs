//! Content-derived identifiers used as cache-key components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel used when a dataset's shape cannot be introspected.
pub const UNKNOWN_FINGERPRINT: &str = "unknown";

/// A hex digest identifying a normalized question or a dataset schema.
///
/// Only meant to keep accidental collisions unlikely; it is not a security token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed digest.
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// The sentinel fingerprint shared by every dataset that failed introspection.
    pub fn unknown() -> Self {
        Self(UNKNOWN_FINGERPRINT.to_string())
    }

    /// Whether this is the sentinel rather than a real digest.
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_FINGERPRINT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(digest: String) -> Self {
        Self(digest)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
