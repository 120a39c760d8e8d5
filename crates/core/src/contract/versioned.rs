//! Store-stamped values
//!
//! A store never hands out a bare body: whatever it returns carries the
//! version the document is at and the time that version was written.

use super::{Timestamp, Version};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A value as of one store version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Body as written
    pub value: T,
    /// Store version of the write
    pub version: Version,
    /// When the store accepted the write
    pub written_at: Timestamp,
}

impl<T> Versioned<T> {
    /// Wrap `value` as written at `version` and `written_at`
    pub fn new(value: T, version: Version, written_at: Timestamp) -> Self {
        Versioned {
            value,
            version,
            written_at,
        }
    }

    /// Borrow the body
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Take the body, dropping the stamp
    pub fn into_value(self) -> T {
        self.value
    }

    /// Store version of the write
    pub fn version(&self) -> Version {
        self.version
    }

    /// When the store accepted the write
    pub fn written_at(&self) -> Timestamp {
        self.written_at
    }

    /// Time elapsed since the write, `None` if `now` precedes it
    pub fn age_at(&self, now: Timestamp) -> Option<Duration> {
        now.duration_since(self.written_at)
    }

    /// Check if this write supersedes `other`
    pub fn supersedes<U>(&self, other: &Versioned<U>) -> bool {
        self.version > other.version
    }
}
