//! Version tokens for optimistic concurrency
//!
//! Every committed write to a document produces a new version. The store
//! assigns versions: a document starts at 1 when it is created and advances
//! by exactly one per committed write (soft deletes included).
//!
//! Clients never mint versions. They only echo back the version they last
//! observed, as the precondition of their next write.
//!
//! ## Comparison
//!
//! Versions are totally ordered, but the save protocol compares them for
//! strict equality only: a held version that is behind *or ahead of* the
//! stored one is a conflict.

use serde::{Deserialize, Serialize};

/// Store-assigned, per-document version counter
///
/// ## Invariants
///
/// - Versions start at [`Version::INITIAL`] on creation
/// - Each committed write advances the version by exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly created document
    pub const INITIAL: Version = Version(1);

    /// Wrap a raw counter value as reported by a store
    #[inline]
    pub const fn new(n: u64) -> Self {
        Version(n)
    }

    /// Get the numeric value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The version the next committed write will produce
    ///
    /// Saturates at `u64::MAX`.
    #[inline]
    pub const fn next(&self) -> Self {
        Version(self.0.saturating_add(1))
    }

    /// The version this one superseded, if any
    pub fn previous(&self) -> Option<Self> {
        if self.0 > Self::INITIAL.0 {
            Some(Version(self.0 - 1))
        } else {
            None
        }
    }

    /// Check if this is the creation version
    #[inline]
    pub const fn is_initial(&self) -> bool {
        self.0 == Self::INITIAL.0
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::INITIAL
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Version(v)
    }
}

impl From<Version> for u64 {
    fn from(v: Version) -> Self {
        v.0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_version_is_one() {
        assert_eq!(Version::INITIAL.as_u64(), 1);
        assert!(Version::INITIAL.is_initial());
        assert_eq!(Version::default(), Version::INITIAL);
    }

    #[test]
    fn test_next_advances_by_one() {
        assert_eq!(Version::new(1).next(), Version::new(2));
        assert_eq!(Version::new(41).next().as_u64(), 42);
    }

    #[test]
    fn test_next_saturates() {
        assert_eq!(Version::new(u64::MAX).next(), Version::new(u64::MAX));
    }

    #[test]
    fn test_previous() {
        assert_eq!(Version::new(3).previous(), Some(Version::new(2)));
        assert_eq!(Version::INITIAL.previous(), None);
        assert_eq!(Version::new(0).previous(), None);
    }

    #[test]
    fn test_ordering_and_equality() {
        assert!(Version::new(1) < Version::new(2));
        assert_ne!(Version::new(2), Version::new(3));
        assert_eq!(Version::from(7u64), Version::new(7));
    }

    #[test]
    fn test_display() {
        assert_eq!(Version::new(5).to_string(), "v5");
    }

    #[test]
    fn test_serializes_as_bare_integer() {
        let json = serde_json::to_string(&Version::new(12)).unwrap();
        assert_eq!(json, "12");
        let restored: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, Version::new(12));
    }
}
