//! Versioned model storage with read-copy-update swaps.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::PredictionModel;
use crate::domain::ModelVersion;

/// Shared handle to one immutable model version.
pub type ModelHandle = Arc<dyn PredictionModel>;

/// Capability for fetching and replacing the active model.
pub trait ModelSource: Send + Sync {
    /// Handle to the currently active model.
    fn active_version(&self) -> ModelHandle;

    /// Install `next` as the active model and return the replaced version.
    fn swap(&self, next: ModelHandle) -> ModelVersion;
}

/// In-process model store.
///
/// Readers clone the `Arc` under a read lock; a swap only holds the write
/// lock for the pointer exchange. Training happens before `swap` is called.
pub struct ModelStore {
    active: RwLock<ModelHandle>,
}

impl ModelStore {
    pub fn new(initial: ModelHandle) -> Self {
        Self {
            active: RwLock::new(initial),
        }
    }

    pub fn version(&self) -> ModelVersion {
        self.active.read().version()
    }
}

impl ModelSource for ModelStore {
    fn active_version(&self) -> ModelHandle {
        Arc::clone(&self.active.read())
    }

    fn swap(&self, next: ModelHandle) -> ModelVersion {
        let next_version = next.version();
        let previous = std::mem::replace(&mut *self.active.write(), next);
        let prev_version = previous.version();
        info!(from = %prev_version, to = %next_version, "model swapped");
        prev_version
    }
}
