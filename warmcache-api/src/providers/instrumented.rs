//! Metrics decorator for acquirers.

use async_trait::async_trait;
use std::time::Instant;
use warmcache_core::{AcquireError, Acquirer, Payload, ResourceId, SharedAcquirer};

use crate::telemetry::metrics;

/// Records `warmcache_acquisitions_total` and
/// `warmcache_acquisition_duration_seconds` around every call.
pub struct InstrumentedAcquirer {
    inner: SharedAcquirer,
}

impl InstrumentedAcquirer {
    pub fn new(inner: SharedAcquirer) -> Self {
        Self { inner }
    }
}

/// Metric label for an acquisition result.
pub fn status_label(result: &Result<Payload, AcquireError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(AcquireError::Failed { .. }) => "failed",
        Err(AcquireError::Timeout { .. }) => "timeout",
        Err(AcquireError::InvalidPayload { .. }) => "invalid_payload",
        Err(AcquireError::Panicked { .. }) => "panicked",
    }
}

#[async_trait]
impl Acquirer for InstrumentedAcquirer {
    async fn acquire(&self, resource_id: &ResourceId) -> Result<Payload, AcquireError> {
        let start = Instant::now();
        let result = self.inner.acquire(resource_id).await;
        if let Some(metrics) = metrics() {
            metrics.record_acquisition(
                resource_id.as_str(),
                status_label(&result),
                start.elapsed().as_secs_f64(),
            );
        }
        result
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }
}
