//! warmcache Core - Entity Types
//!
//! Pure data structures shared by every other crate: resource identity,
//! cache entries, the staleness policy, the time source and the acquisition
//! capability. No I/O happens here.

pub mod acquire;
pub mod clock;
pub mod error;
pub mod staleness;

pub use acquire::{Acquirer, SharedAcquirer};
pub use clock::{Clock, SharedClock, SystemClock};
pub use error::{
    AcquireError, ConfigError, RefreshError, StorageError, ValidationError, WarmcacheError,
    WarmcacheResult,
};
pub use staleness::{Staleness, StalenessPolicy};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Opaque payload produced by an acquisition. The cache never looks inside.
pub type Payload = serde_json::Value;

/// Identifier of one cacheable dataset.
///
/// Resource ids double as storage keys (and file names for the file-backed
/// store), so they are restricted to lowercase ASCII alphanumerics, `-` and
/// `_`, must start with an alphanumeric and are at most
/// [`ResourceId::MAX_LEN`] bytes long.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub const MAX_LEN: usize = 64;

    /// Validate and wrap a resource id.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let invalid = |reason: &str| ValidationError::InvalidResourceId {
            value: value.clone(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if value.len() > Self::MAX_LEN {
            return Err(invalid("too long"));
        }
        if !value
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(invalid("must start with a lowercase letter or digit"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(invalid("only lowercase letters, digits, '-' and '_' are allowed"));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResourceId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

// ============================================================================
// CACHE ENTRY
// ============================================================================

/// One persisted snapshot of a resource.
///
/// Entries are replaced wholesale by the store, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub resource_id: ResourceId,
    pub payload: Payload,
    pub acquired_at: Timestamp,
}

impl CacheEntry {
    pub fn new(resource_id: ResourceId, payload: Payload, acquired_at: Timestamp) -> Self {
        Self {
            resource_id,
            payload,
            acquired_at,
        }
    }

    /// Age of the entry as of `now`. Zero if `acquired_at` lies in the future.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.acquired_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Introspection data for a stored entry. Never triggers acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub exists: bool,
    pub acquired_at: Option<Timestamp>,
    /// Size of the persisted document in bytes.
    pub size_bytes: Option<u64>,
}

impl EntryMetadata {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present(acquired_at: Timestamp, size_bytes: u64) -> Self {
        Self {
            exists: true,
            acquired_at: Some(acquired_at),
            size_bytes: Some(size_bytes),
        }
    }
}
