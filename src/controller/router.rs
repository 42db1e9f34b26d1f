//! Inbound frame dispatch
//!
//! The one place that decides what an inbound frame means. Each message
//! type forwards to its owning session; the outcome maps to events and,
//! for mutating operations, the follow-up listing refresh.

use tracing::{debug, warn};

use super::DeviceLink;
use crate::events::LinkEvent;
use crate::protocol::{self, Inbound};
use crate::upload::UploadOutcome;

pub(super) async fn dispatch(link: &DeviceLink, raw: &str) {
    let message = match protocol::decode_inbound(raw) {
        Ok(message) => message,
        Err(err) => {
            warn!("dropping inbound frame: {}", err);
            return;
        }
    };

    match message {
        Inbound::Cli { data } => {
            let appended = link.cli.append_remote(&data);
            if appended > 0 {
                link.emit(LinkEvent::TranscriptGrew { appended });
            }
        }

        Inbound::FileList { paths } => {
            let count = link.catalog.replace(paths);
            link.emit(LinkEvent::FileListReplaced { count });
        }

        Inbound::Upload { status, .. } => match link.upload.on_device_response(&status).await {
            UploadOutcome::Completed { path } => {
                link.emit(LinkEvent::UploadCompleted { path });
                if let Err(err) = link.catalog.refresh().await {
                    warn!("listing refresh after upload failed: {}", err);
                }
            }
            UploadOutcome::Refused { path, reason } => {
                link.emit(LinkEvent::UploadRefused { path, reason });
            }
            UploadOutcome::Failed { path, error } => {
                link.emit(LinkEvent::UploadFailed {
                    path,
                    reason: error.to_string(),
                });
            }
            UploadOutcome::Stray { status } => {
                debug!("ignoring upload response `{}` with nothing outstanding", status);
            }
        },

        Inbound::Delete { status, name } => {
            if status == protocol::DELETE_OK {
                if let Err(err) = link.catalog.refresh().await {
                    warn!("listing refresh after deletion failed: {}", err);
                }
            } else {
                warn!("device refused deletion: {}", status);
                link.emit(LinkEvent::DeletionFailed {
                    path: name,
                    reason: status,
                });
            }
        }
    }
}
