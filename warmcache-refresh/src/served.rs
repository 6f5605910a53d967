//! Values the coordinator hands back to the adapter layer.

use serde::Serialize;
use warmcache_core::{AcquireError, CacheEntry, Payload, ResourceId, StorageError, Timestamp};

/// How a read was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServeKind {
    /// No entry existed; acquired synchronously.
    Cold,
    /// Entry within policy.
    Fresh,
    /// Entry past policy; a background refresh is running.
    Stale,
    /// Acquired synchronously on explicit request.
    Forced,
    /// Served the result of an acquisition another caller had in flight.
    Joined,
}

impl ServeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Forced => "forced",
            Self::Joined => "joined",
        }
    }
}

/// A payload plus the annotations describing where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServedPayload {
    pub resource_id: ResourceId,
    pub payload: Payload,
    pub kind: ServeKind,
    /// Served from the persisted entry rather than a just-finished acquisition.
    pub from_cache: bool,
    /// The served entry is within policy. Never true for stale data.
    pub cache_valid: bool,
    pub refreshing_in_background: bool,
    /// Acquisition time of the cached entry; absent when freshly acquired.
    pub cache_date: Option<Timestamp>,
    /// When the served payload was acquired.
    pub acquired_at: Timestamp,
    pub forced: bool,
    /// The caller waited on an acquisition started by someone else.
    pub joined_in_flight: bool,
}

impl ServedPayload {
    pub(crate) fn fresh(entry: CacheEntry) -> Self {
        Self::from_entry(entry, ServeKind::Fresh, true, false)
    }

    pub(crate) fn stale(entry: CacheEntry) -> Self {
        Self::from_entry(entry, ServeKind::Stale, false, true)
    }

    pub(crate) fn joined(entry: CacheEntry, cache_valid: bool) -> Self {
        let mut served = Self::from_entry(entry, ServeKind::Joined, cache_valid, false);
        served.joined_in_flight = true;
        served
    }

    /// A payload that was acquired by this call.
    pub(crate) fn acquired(
        resource_id: ResourceId,
        payload: Payload,
        acquired_at: Timestamp,
        forced: bool,
    ) -> Self {
        Self {
            resource_id,
            payload,
            kind: if forced { ServeKind::Forced } else { ServeKind::Cold },
            from_cache: false,
            cache_valid: true,
            refreshing_in_background: false,
            cache_date: None,
            acquired_at,
            forced,
            joined_in_flight: false,
        }
    }

    /// A forced refresh that was satisfied by a concurrent acquisition.
    pub(crate) fn forced_joined(entry: CacheEntry, cache_valid: bool) -> Self {
        Self {
            resource_id: entry.resource_id,
            payload: entry.payload,
            kind: ServeKind::Joined,
            from_cache: false,
            cache_valid,
            refreshing_in_background: false,
            cache_date: None,
            acquired_at: entry.acquired_at,
            forced: true,
            joined_in_flight: true,
        }
    }

    fn from_entry(
        entry: CacheEntry,
        kind: ServeKind,
        cache_valid: bool,
        refreshing_in_background: bool,
    ) -> Self {
        Self {
            resource_id: entry.resource_id,
            payload: entry.payload,
            kind,
            from_cache: true,
            cache_valid,
            refreshing_in_background,
            cache_date: Some(entry.acquired_at),
            acquired_at: entry.acquired_at,
            forced: false,
            joined_in_flight: false,
        }
    }
}

/// Read-only view of one resource's cache state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    pub resource_id: ResourceId,
    pub exists: bool,
    /// Entry exists and is within policy.
    pub valid: bool,
    pub last_acquired: Option<Timestamp>,
    pub refreshing: bool,
    pub size_bytes: Option<u64>,
    pub age_secs: Option<u64>,
    /// Human-readable staleness policy.
    pub policy: String,
    pub ttl_secs: Option<u64>,
}

/// Result of [`RefreshCoordinator::warm`](crate::RefreshCoordinator::warm).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmOutcome {
    /// Entry was within policy; nothing ran.
    AlreadyFresh,
    /// A new entry was acquired and stored.
    Refreshed,
    /// Another refresh was already in flight.
    Skipped,
    /// Acquisition failed; any previous entry is untouched.
    Failed(AcquireError),
    /// Acquisition succeeded but the store rejected the write.
    NotStored(StorageError),
}

impl WarmOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyFresh => "already_fresh",
            Self::Refreshed => "refreshed",
            Self::Skipped => "skipped",
            Self::Failed(_) => "failed",
            Self::NotStored(_) => "not_stored",
        }
    }
}
