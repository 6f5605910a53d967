//! Staleness classification.
//!
//! A [`StalenessPolicy`] is fixed per resource at startup. It turns "is there
//! an entry, and when was it acquired" into one of three states that drive
//! the refresh coordinator.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{CacheEntry, Timestamp};

/// Classification of a resource's cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Staleness {
    /// No entry exists.
    Cold,
    /// Entry exists and is within policy.
    Fresh,
    /// Entry exists but policy says it should be replaced.
    Stale,
}

impl Staleness {
    pub fn is_cold(&self) -> bool {
        matches!(self, Self::Cold)
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }
}

/// Per-resource staleness rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessPolicy {
    /// Stale once `now - acquired_at >= ttl`.
    MaxAge(Duration),
    /// Stale once the calendar date (in `utc_offset`) has moved past the
    /// date the entry was acquired on. Suits datasets published once a day.
    CalendarDay { utc_offset: FixedOffset },
}

impl StalenessPolicy {
    pub fn max_age(ttl: Duration) -> Self {
        Self::MaxAge(ttl)
    }

    pub fn calendar_day(utc_offset: FixedOffset) -> Self {
        Self::CalendarDay { utc_offset }
    }

    /// Calendar-day policy evaluated in UTC.
    pub fn calendar_day_utc() -> Self {
        Self::CalendarDay {
            utc_offset: Utc.fix(),
        }
    }

    /// Classify an entry (or its absence) as of `now`.
    pub fn classify(&self, entry: Option<&CacheEntry>, now: Timestamp) -> Staleness {
        match entry {
            None => Staleness::Cold,
            Some(entry) => self.classify_acquired_at(entry.acquired_at, now),
        }
    }

    /// Classify an entry known to exist, given only its acquisition time.
    pub fn classify_acquired_at(&self, acquired_at: Timestamp, now: Timestamp) -> Staleness {
        if self.is_stale(acquired_at, now) {
            Staleness::Stale
        } else {
            Staleness::Fresh
        }
    }

    /// Whether an entry acquired at `acquired_at` is stale at `now`.
    ///
    /// An entry stamped in the future (clock skew) is never stale.
    pub fn is_stale(&self, acquired_at: Timestamp, now: Timestamp) -> bool {
        match self {
            Self::MaxAge(ttl) => match now.signed_duration_since(acquired_at).to_std() {
                Ok(age) => age >= *ttl,
                Err(_) => false,
            },
            Self::CalendarDay { utc_offset } => {
                let acquired_on = acquired_at.with_timezone(utc_offset).date_naive();
                let today = now.with_timezone(utc_offset).date_naive();
                acquired_on < today
            }
        }
    }

    /// TTL in seconds for max-age policies.
    pub fn ttl_secs(&self) -> Option<u64> {
        match self {
            Self::MaxAge(ttl) => Some(ttl.as_secs()),
            Self::CalendarDay { .. } => None,
        }
    }
}

impl fmt::Display for StalenessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxAge(ttl) => write!(f, "max-age {}s", ttl.as_secs()),
            Self::CalendarDay { utc_offset } => write!(f, "calendar-day (UTC{})", utc_offset),
        }
    }
}
