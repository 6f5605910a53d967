//! Time source abstraction.
//!
//! Staleness is a function of "now", so the coordinator and stores read time
//! through [`Clock`] instead of calling `Utc::now()` directly. Tests swap in a
//! manually driven clock to move across TTL boundaries.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;

use crate::Timestamp;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}
