//! Notifications pushed to the UI collaborator
//!
//! The controller never calls back into the UI directly; it emits
//! [`LinkEvent`]s over an unbounded channel handed out at construction.
//! Events are serializable so a frontend bridge can forward them verbatim.

use serde::Serialize;

/// One controller notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LinkEvent {
    /// The transcript gained `appended` lines (auto-scroll hint).
    TranscriptGrew { appended: usize },
    /// The cached listing was replaced wholesale with `count` paths.
    FileListReplaced { count: usize },
    /// The upload payload was flushed and a listing refresh requested.
    UploadCompleted { path: String },
    /// The device declined the upload request; nothing was sent.
    UploadRefused { path: String, reason: String },
    /// The flush itself failed after the device said ready
    /// (payload mismatch or channel loss); nothing stale was sent.
    UploadFailed { path: String, reason: String },
    /// The device declined a deletion; the cache is untouched.
    DeletionFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        reason: String,
    },
    /// The channel is gone. The link is spent; build a fresh one to
    /// reconnect.
    Closed { reason: String },
}
