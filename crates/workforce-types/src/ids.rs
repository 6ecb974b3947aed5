//! Identifier newtypes.
//!
//! Employee identifiers come from the source census (or are synthesized for
//! new hires) and are opaque strings. Event identifiers are UUIDs derived
//! from the content hash of the event's position in the log, so two runs
//! with the same seed produce identical identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a workforce member.
///
/// The full string participates in every deterministic draw, so two
/// identifiers that share a length or prefix still produce unrelated
/// random streams.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    /// Create an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Synthetic identifier for the `ordinal`-th hire of `year`
    /// (`NH_2025_000001`).
    pub fn new_hire(year: i32, ordinal: u32) -> Self {
        Self(format!("NH_{year}_{ordinal:06}"))
    }

    /// The year of a synthetic new-hire identifier (`NH_{year}_...`).
    pub fn new_hire_year(&self) -> Option<i32> {
        let rest = self.0.strip_prefix("NH_")?;
        let (year, ordinal) = rest.split_once('_')?;
        if ordinal.is_empty() {
            return None;
        }
        year.parse().ok()
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl core::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmployeeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for EmployeeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unique identifier for an event in the event log.
///
/// Built from the first 16 bytes of a SHA-256 digest as a version 8 UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Build an identifier from 16 bytes of hash output.
    pub fn from_hash_prefix(bytes: [u8; 16]) -> Self {
        Self(Uuid::new_v8(bytes))
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}
