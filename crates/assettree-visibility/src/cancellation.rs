use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TreeError;

/// Issues request tokens where the most recently issued one wins: starting a
/// new request supersedes every token issued before it.
#[derive(Clone, Default)]
pub struct LatestRequest {
    latest: Arc<AtomicU64>,
}

impl LatestRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding all earlier ones.
    pub fn begin(&self) -> RequestToken {
        let id = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        RequestToken {
            id,
            latest: Arc::clone(&self.latest),
        }
    }

    /// Abandon whatever request is in flight without starting a new one.
    pub fn cancel_all(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub struct RequestToken {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl RequestToken {
    pub fn is_superseded(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.id
    }

    /// Checkpoint to call after every suspension point.
    pub fn ensure_current(&self) -> Result<(), TreeError> {
        if self.is_superseded() {
            Err(TreeError::Superseded)
        } else {
            Ok(())
        }
    }
}
