//! Error types for warmcache operations

use std::time::Duration;
use thiserror::Error;

use crate::ResourceId;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("I/O failed for {resource_id}: {reason}")]
    Io {
        resource_id: ResourceId,
        reason: String,
    },

    #[error("Serialization failed for {resource_id}: {reason}")]
    Serialization {
        resource_id: ResourceId,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Failures reported by an acquisition collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("Acquisition of {resource_id} failed: {reason}")]
    Failed {
        resource_id: ResourceId,
        reason: String,
    },

    #[error("Acquisition of {resource_id} timed out after {after:?}")]
    Timeout {
        resource_id: ResourceId,
        after: Duration,
    },

    #[error("Acquisition of {resource_id} produced an invalid payload: {reason}")]
    InvalidPayload {
        resource_id: ResourceId,
        reason: String,
    },

    #[error("Acquisition of {resource_id} panicked")]
    Panicked { resource_id: ResourceId },
}

impl AcquireError {
    /// Convenience constructor for the generic failure case.
    pub fn failed(resource_id: &ResourceId, reason: impl Into<String>) -> Self {
        Self::Failed {
            resource_id: resource_id.clone(),
            reason: reason.into(),
        }
    }

    /// The resource the failed acquisition was for.
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Self::Failed { resource_id, .. }
            | Self::Timeout { resource_id, .. }
            | Self::InvalidPayload { resource_id, .. }
            | Self::Panicked { resource_id } => resource_id,
        }
    }
}

/// Errors surfaced by the refresh coordinator to its callers.
///
/// Only the synchronous paths (cold read, forced refresh) produce these;
/// background refresh failures are logged and never returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Unknown resource: {resource_id}")]
    UnknownResource { resource_id: ResourceId },

    #[error("No cached entry for {resource_id} and acquisition failed: {source}")]
    ColdAcquisitionFailed {
        resource_id: ResourceId,
        #[source]
        source: AcquireError,
    },

    #[error("Forced refresh of {resource_id} failed: {source}")]
    ForcedRefreshFailed {
        resource_id: ResourceId,
        #[source]
        source: AcquireError,
    },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid resource id {value:?}: {reason}")]
    InvalidResourceId { value: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Master error type for all warmcache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WarmcacheError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Acquire error: {0}")]
    Acquire(#[from] AcquireError),

    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for warmcache operations.
pub type WarmcacheResult<T> = Result<T, WarmcacheError>;

// =============================================================================
// TESTS
// =============================================================================
