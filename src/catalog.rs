//! File catalog: cached listing of the device filesystem
//!
//! The device is the source of truth: every `fileList` response replaces
//! the cache wholesale, in device order. Mutating operations (upload
//! completion, successful deletion) trigger an automatic refresh rather
//! than patching the cache locally.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::protocol::{validate_device_path, Outbound, PathError};
use crate::transport::{TransportError, Wire};

/// Why a catalog operation failed.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid device path: {0}")]
    InvalidPath(#[from] PathError),

    /// Not in the cached listing. The cache may be stale; the device's
    /// own verdict on the deletion stays authoritative either way.
    #[error("path `{0}` is not in the cached listing")]
    UnknownPath(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Cached, authoritative-from-device file listing.
pub struct FileCatalog {
    wire: Arc<dyn Wire>,
    files: RwLock<Vec<String>>,
}

impl FileCatalog {
    pub(crate) fn new(wire: Arc<dyn Wire>) -> Self {
        Self {
            wire,
            files: RwLock::new(Vec::new()),
        }
    }

    /// Request a fresh listing.
    ///
    /// Idempotent: issuing it while a previous refresh is outstanding
    /// simply re-requests; the latest response wins.
    pub async fn refresh(&self) -> Result<(), CatalogError> {
        self.wire.send_text(Outbound::FileList.to_frame()).await?;
        Ok(())
    }

    /// Replace the cache wholesale. Readers never observe a partial swap.
    pub(crate) fn replace(&self, paths: Vec<String>) -> usize {
        let count = paths.len();
        *self.files.write() = paths;
        debug!("file listing replaced: {} paths", count);
        count
    }

    /// Ask the device to delete `path`.
    ///
    /// Validated against the path rules and the cached listing before any
    /// channel write. The cache is only updated once the device confirms
    /// and the follow-up refresh lands.
    pub async fn request_deletion(&self, path: &str) -> Result<(), CatalogError> {
        validate_device_path(path)?;
        if !self.contains(path) {
            return Err(CatalogError::UnknownPath(path.to_string()));
        }

        self.wire
            .send_text(
                Outbound::Delete {
                    path: path.to_string(),
                }
                .to_frame(),
            )
            .await?;
        Ok(())
    }

    /// Snapshot of the cached listing, device order.
    pub fn files(&self) -> Vec<String> {
        self.files.read().clone()
    }

    /// Whether `path` is in the cached listing.
    pub fn contains(&self, path: &str) -> bool {
        self.files.read().iter().any(|p| p == path)
    }
}
