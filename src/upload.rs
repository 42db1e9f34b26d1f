//! Upload session: the two-phase handshake state machine
//!
//! `Idle → Requested → {Sending | refused} → Idle`. The client announces
//! `{name, size}`, the device answers `"ready"` or a refusal reason, and
//! only a `"ready"` is followed by exactly one raw binary frame. At most
//! one transfer is in flight; a second request while one is outstanding is
//! rejected, never silently overwritten.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::protocol::{validate_device_path, Outbound, PathError, UPLOAD_READY};
use crate::transport::{TransportError, Wire};

/// Why an upload could not be started or finished.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid device path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("payload is {size} bytes, configured ceiling is {limit}")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// A transfer is already outstanding; the pending descriptor is
    /// untouched.
    #[error("an upload is already in flight")]
    UploadInProgress,

    /// The payload produced at flush time does not match the announced
    /// size. Nothing is sent; stale data never goes out.
    #[error("payload is {actual} bytes but {announced} were announced")]
    PayloadMismatch { announced: u64, actual: u64 },

    #[error("failed to read upload payload: {0}")]
    Source(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Produces the bytes of one upload.
///
/// `size` is announced to the device up front; `read` produces the payload
/// when the device signals readiness. The two are validated against each
/// other immediately before the flush, so a source whose backing data
/// changed in between fails with [`UploadError::PayloadMismatch`] instead
/// of sending stale bytes.
#[async_trait]
pub trait UploadSource: Send + Sync {
    /// Byte size announced in the upload request.
    fn size(&self) -> u64;

    /// Produce the payload at flush time.
    async fn read(&self) -> std::io::Result<Bytes>;
}

#[async_trait]
impl UploadSource for Bytes {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    async fn read(&self) -> std::io::Result<Bytes> {
        Ok(self.clone())
    }
}

/// File-backed upload source. The size is captured at open time; the file
/// is re-read when the device is ready, so an edit in between trips the
/// mismatch check rather than uploading a half-truth.
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// Capture the file's current size for the announcement.
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(Self {
            path,
            size: metadata.len(),
        })
    }
}

#[async_trait]
impl UploadSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read(&self) -> std::io::Result<Bytes> {
        Ok(Bytes::from(tokio::fs::read(&self.path).await?))
    }
}

/// The single outstanding transfer descriptor.
struct PendingUpload {
    target_path: String,
    size: u64,
    source: Box<dyn UploadSource>,
}

enum UploadState {
    Idle,
    Requested(PendingUpload),
    Sending,
}

/// What a device verdict led to. Consumed by the router, which turns it
/// into events and the follow-up listing refresh.
#[derive(Debug)]
pub(crate) enum UploadOutcome {
    Completed { path: String },
    Refused { path: String, reason: String },
    Failed { path: String, error: UploadError },
    Stray { status: String },
}

/// Two-phase upload coordinator. Holds at most one in-flight transfer.
pub struct UploadSession {
    wire: Arc<dyn Wire>,
    state: Mutex<UploadState>,
    max_payload: u64,
}

impl UploadSession {
    pub(crate) fn new(wire: Arc<dyn Wire>, max_payload: u64) -> Self {
        Self {
            wire,
            state: Mutex::new(UploadState::Idle),
            max_payload,
        }
    }

    /// Announce an upload of `source` to `path`.
    ///
    /// Validates path and size before any channel write, transmits the
    /// structured request, and returns immediately; the device's verdict
    /// arrives asynchronously and resolves into an upload event.
    pub async fn request_upload<S>(&self, path: &str, source: S) -> Result<(), UploadError>
    where
        S: UploadSource + 'static,
    {
        let mut state = self.state.lock().await;
        if !matches!(*state, UploadState::Idle) {
            return Err(UploadError::UploadInProgress);
        }

        validate_device_path(path)?;
        let size = source.size();
        if size > self.max_payload {
            return Err(UploadError::PayloadTooLarge {
                size,
                limit: self.max_payload,
            });
        }

        self.wire
            .send_text(
                Outbound::Upload {
                    name: path.to_string(),
                    size,
                }
                .to_frame(),
            )
            .await?;

        *state = UploadState::Requested(PendingUpload {
            target_path: path.to_string(),
            size,
            source: Box::new(source),
        });
        debug!("upload requested: {} ({} bytes)", path, size);
        Ok(())
    }

    /// Whether a transfer is outstanding (requested or mid-flush).
    pub async fn in_flight(&self) -> bool {
        !matches!(*self.state.lock().await, UploadState::Idle)
    }

    /// Feed the device's verdict on the outstanding request.
    pub(crate) async fn on_device_response(&self, status: &str) -> UploadOutcome {
        let pending = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, UploadState::Idle) {
                UploadState::Requested(pending) if status == UPLOAD_READY => {
                    *state = UploadState::Sending;
                    pending
                }
                UploadState::Requested(pending) => {
                    info!(
                        "device refused upload of {}: {}",
                        pending.target_path, status
                    );
                    return UploadOutcome::Refused {
                        path: pending.target_path,
                        reason: status.to_string(),
                    };
                }
                other => {
                    *state = other;
                    return UploadOutcome::Stray {
                        status: status.to_string(),
                    };
                }
            }
        };

        let result = self.flush(&pending).await;
        *self.state.lock().await = UploadState::Idle;

        match result {
            Ok(()) => {
                info!(
                    "upload complete: {} ({} bytes)",
                    pending.target_path, pending.size
                );
                UploadOutcome::Completed {
                    path: pending.target_path,
                }
            }
            Err(error) => {
                warn!("upload of {} failed: {}", pending.target_path, error);
                UploadOutcome::Failed {
                    path: pending.target_path,
                    error,
                }
            }
        }
    }

    /// Discard the pending descriptor when the link goes down.
    pub(crate) async fn clear_on_close(&self) {
        let mut state = self.state.lock().await;
        if let UploadState::Requested(pending) = std::mem::replace(&mut *state, UploadState::Idle)
        {
            info!(
                "link closed with upload of {} outstanding; descriptor discarded",
                pending.target_path
            );
        }
    }

    /// Re-validate and transmit the payload. Exactly one binary frame on
    /// success, none otherwise.
    async fn flush(&self, pending: &PendingUpload) -> Result<(), UploadError> {
        let payload = pending.source.read().await?;
        let actual = payload.len() as u64;
        if actual != pending.size {
            return Err(UploadError::PayloadMismatch {
                announced: pending.size,
                actual,
            });
        }
        self.wire.send_binary(payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{RecordingWire, SentFrame};

    /// Source whose announced size does not match what it produces.
    struct LyingSource {
        announced: u64,
        actual: Bytes,
    }

    #[async_trait]
    impl UploadSource for LyingSource {
        fn size(&self) -> u64 {
            self.announced
        }

        async fn read(&self) -> std::io::Result<Bytes> {
            Ok(self.actual.clone())
        }
    }

    fn session() -> (Arc<RecordingWire>, UploadSession) {
        let wire = Arc::new(RecordingWire::new());
        let session = UploadSession::new(wire.clone(), 1024);
        (wire, session)
    }

    #[tokio::test]
    async fn test_request_announces_name_and_size() {
        let (wire, session) = session();

        session
            .request_upload("/hello.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert_eq!(
            wire.texts(),
            vec![r#"{"type":"upload","name":"/hello.txt","size":5}"#]
        );
        // No further writes until the device answers
        assert_eq!(wire.sent_count(), 1);
        assert!(session.in_flight().await);
    }

    #[tokio::test]
    async fn test_invalid_paths_write_nothing() {
        let (wire, session) = session();
        let payload = Bytes::from_static(b"x");

        let too_long = format!("/{}", "x".repeat(31));
        for path in ["", "hello.txt", "/dir/", too_long.as_str()] {
            let err = session.request_upload(path, payload.clone()).await;
            assert!(matches!(err, Err(UploadError::InvalidPath(_))), "{path}");
        }

        assert_eq!(wire.sent_count(), 0);
        assert!(!session.in_flight().await);
    }

    #[tokio::test]
    async fn test_oversized_payload_writes_nothing() {
        let (wire, session) = session();

        let err = session
            .request_upload("/big.bin", Bytes::from(vec![0u8; 2048]))
            .await;

        assert!(matches!(
            err,
            Err(UploadError::PayloadTooLarge { size: 2048, limit: 1024 })
        ));
        assert_eq!(wire.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_second_request_is_rejected() {
        let (wire, session) = session();

        session
            .request_upload("/first.txt", Bytes::from_static(b"first"))
            .await
            .unwrap();
        let err = session
            .request_upload("/second.txt", Bytes::from_static(b"second"))
            .await;

        assert!(matches!(err, Err(UploadError::UploadInProgress)));
        // The original request is untouched: ready flushes the first payload
        let outcome = session.on_device_response("ready").await;
        assert!(matches!(outcome, UploadOutcome::Completed { path } if path == "/first.txt"));
        assert_eq!(
            wire.binaries(),
            vec![Bytes::from_static(b"first")]
        );
    }

    #[tokio::test]
    async fn test_ready_flushes_exactly_one_binary_frame() {
        let (wire, session) = session();
        let payload = Bytes::from_static(b"payload");

        session
            .request_upload("/p.bin", payload.clone())
            .await
            .unwrap();
        let outcome = session.on_device_response("ready").await;

        assert!(matches!(outcome, UploadOutcome::Completed { .. }));
        assert_eq!(
            wire.sent(),
            vec![
                SentFrame::Text(r#"{"type":"upload","name":"/p.bin","size":7}"#.into()),
                SentFrame::Binary(payload),
            ]
        );
        assert!(!session.in_flight().await);
    }

    #[tokio::test]
    async fn test_refusal_sends_nothing_and_clears() {
        let (wire, session) = session();

        session
            .request_upload("/p.bin", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        let outcome = session.on_device_response("tooLarge").await;

        assert!(
            matches!(outcome, UploadOutcome::Refused { reason, .. } if reason == "tooLarge")
        );
        assert!(wire.binaries().is_empty());
        assert!(!session.in_flight().await);

        // Session is reusable after a refusal
        session
            .request_upload("/again.bin", Bytes::from_static(b"x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stray_response_changes_nothing() {
        let (wire, session) = session();

        let outcome = session.on_device_response("ready").await;

        assert!(matches!(outcome, UploadOutcome::Stray { .. }));
        assert_eq!(wire.sent_count(), 0);
        assert!(!session.in_flight().await);
    }

    #[tokio::test]
    async fn test_size_divergence_fails_instead_of_sending_stale_data() {
        let (wire, session) = session();

        session
            .request_upload(
                "/p.bin",
                LyingSource {
                    announced: 10,
                    actual: Bytes::from_static(b"short"),
                },
            )
            .await
            .unwrap();
        let outcome = session.on_device_response("ready").await;

        assert!(matches!(
            outcome,
            UploadOutcome::Failed {
                error: UploadError::PayloadMismatch {
                    announced: 10,
                    actual: 5
                },
                ..
            }
        ));
        assert!(wire.binaries().is_empty());
        assert!(!session.in_flight().await);
    }

    #[tokio::test]
    async fn test_close_discards_pending_descriptor() {
        let (_, session) = session();

        session
            .request_upload("/p.bin", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        session.clear_on_close().await;

        assert!(!session.in_flight().await);
    }

    #[tokio::test]
    async fn test_file_source_reflects_edits_as_mismatch() {
        let (wire, session) = session();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("program.f");
        tokio::fs::write(&path, b"original").await.unwrap();

        let source = FileSource::open(&path).await.unwrap();
        session.request_upload("/program.f", source).await.unwrap();

        // The file changes between the announcement and the flush
        tokio::fs::write(&path, b"rewritten meanwhile").await.unwrap();
        let outcome = session.on_device_response("ready").await;

        assert!(matches!(
            outcome,
            UploadOutcome::Failed {
                error: UploadError::PayloadMismatch { announced: 8, .. },
                ..
            }
        ));
        assert!(wire.binaries().is_empty());
    }

    #[tokio::test]
    async fn test_file_source_round_trip() {
        let (wire, session) = session();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blink.f");
        tokio::fs::write(&path, b": BLINK 13 OUTPUT ;").await.unwrap();

        let source = FileSource::open(&path).await.unwrap();
        session.request_upload("/blink.f", source).await.unwrap();
        let outcome = session.on_device_response("ready").await;

        assert!(matches!(outcome, UploadOutcome::Completed { .. }));
        assert_eq!(
            wire.binaries(),
            vec![Bytes::from_static(b": BLINK 13 OUTPUT ;")]
        );
    }
}
