//! Cooperative cancellation for long-running fits and applies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{DecompositionError, Result};

/// Number of records projected between two stop checks during `apply`.
pub const APPLY_STOP_CHECK_INTERVAL: usize = 1_000;

/// A cloneable flag that a caller flips to abort a running fit or apply.
///
/// Algorithms poll it once per outer iteration (FastICA, GHA), once per block
/// of Gram rows (Kernel PCA) and once per
/// [`APPLY_STOP_CHECK_INTERVAL`] records in `apply`. A raised flag surfaces
/// as [`DecompositionError::Stopped`]; no partial model is returned.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every holder of this handle to stop at its next check.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_stop_requested() {
            Err(DecompositionError::Stopped)
        } else {
            Ok(())
        }
    }
}
