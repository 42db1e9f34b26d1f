//! Wire protocol for the device console channel
//!
//! All structured traffic is JSON text frames, internally tagged by `type`.
//! One raw binary frame kind exists on top of that: the upload payload,
//! transmitted only immediately after the device has answered an upload
//! request with `"ready"`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// WebSocket subprotocol offered at open time.
/// The device's server rejects connections that do not offer it.
pub const SUBPROTOCOL: &str = "arduino";

/// Device-side limit on the byte length of a stored file path
/// (flat SPIFFS-style filesystem, leading slash included).
pub const MAX_PATH_BYTES: usize = 31;

/// Device-side limit on one inbound JSON text frame. The firmware discards
/// longer frames before parsing, so the client refuses to produce them.
pub const MAX_TEXT_FRAME_BYTES: usize = 250;

/// Upload handshake readiness status. Any other status is a refusal reason.
pub const UPLOAD_READY: &str = "ready";

/// Deletion success status. Any other status is a failure reason.
pub const DELETE_OK: &str = "ok";

/// Message received from the device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    /// Interpreter output text; may span multiple lines.
    Cli { data: String },
    /// Full listing replacement, device order.
    FileList { paths: Vec<String> },
    /// Verdict on an upload request.
    Upload {
        status: String,
        /// Path echo, without the leading slash on current firmware.
        #[serde(default)]
        name: Option<String>,
    },
    /// Verdict on a deletion request.
    Delete {
        status: String,
        #[serde(default)]
        name: Option<String>,
    },
}

/// Message sent to the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    /// Execute a command line.
    Cli { data: String },
    /// Request a fresh listing.
    FileList,
    /// Announce an upload of `size` bytes to `name`.
    Upload { name: String, size: u64 },
    /// Request deletion of `path`.
    Delete { path: String },
    /// Fire-and-forget: kill the running program, optionally restarting
    /// the interpreter task. No response is defined.
    Kill {
        #[serde(rename = "restartTask")]
        restart_task: u8,
    },
}

impl Outbound {
    /// Serialize into one text frame.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).expect("outbound messages contain only strings and integers")
    }
}

/// Why an inbound frame was dropped. Never fatal; the router logs and
/// continues.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(String),

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("unrecognized message type `{0}`")]
    UnknownType(String),

    #[error("malformed `{msg_type}` payload: {detail}")]
    Payload { msg_type: String, detail: String },
}

/// Decode one inbound text frame.
///
/// Unknown and malformed frames map to distinct [`FrameError`] variants so
/// the router can log a useful diagnostic before discarding them.
pub fn decode_inbound(raw: &str) -> Result<Inbound, FrameError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| FrameError::Json(e.to_string()))?;

    let msg_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(FrameError::MissingType)?
        .to_string();

    if !matches!(msg_type.as_str(), "cli" | "fileList" | "upload" | "delete") {
        return Err(FrameError::UnknownType(msg_type));
    }

    serde_json::from_value(value).map_err(|e| FrameError::Payload {
        msg_type,
        detail: e.to_string(),
    })
}

/// Why a device path was rejected client-side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path must start with `/`")]
    NotAbsolute,

    #[error("path must not end with `/`")]
    TrailingSlash,

    #[error("path is {0} bytes, device limit is {MAX_PATH_BYTES}")]
    TooLong(usize),
}

/// Validate a device-side file path before it goes anywhere near the wire.
///
/// Absolute, no trailing slash, at most [`MAX_PATH_BYTES`] bytes total.
pub fn validate_device_path(path: &str) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if !path.starts_with('/') {
        return Err(PathError::NotAbsolute);
    }
    if path.ends_with('/') {
        return Err(PathError::TrailingSlash);
    }
    if path.len() > MAX_PATH_BYTES {
        return Err(PathError::TooLong(path.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_frames_match_device_vocabulary() {
        assert_eq!(
            Outbound::Cli {
                data: "DROP".into()
            }
            .to_frame(),
            r#"{"type":"cli","data":"DROP"}"#
        );
        assert_eq!(Outbound::FileList.to_frame(), r#"{"type":"fileList"}"#);
        assert_eq!(
            Outbound::Upload {
                name: "/f.txt".into(),
                size: 5
            }
            .to_frame(),
            r#"{"type":"upload","name":"/f.txt","size":5}"#
        );
        assert_eq!(
            Outbound::Delete {
                path: "/f.txt".into()
            }
            .to_frame(),
            r#"{"type":"delete","path":"/f.txt"}"#
        );
        assert_eq!(
            Outbound::Kill { restart_task: 1 }.to_frame(),
            r#"{"type":"kill","restartTask":1}"#
        );
    }

    #[test]
    fn decodes_inbound_variants() {
        assert_eq!(
            decode_inbound(r#"{"type":"cli","data":"ok\n"}"#).unwrap(),
            Inbound::Cli { data: "ok\n".into() }
        );
        assert_eq!(
            decode_inbound(r#"{"type":"fileList","paths":["/a","/b"]}"#).unwrap(),
            Inbound::FileList {
                paths: vec!["/a".into(), "/b".into()]
            }
        );
        assert_eq!(
            decode_inbound(r#"{"type":"upload","status":"ready","name":"f.txt"}"#).unwrap(),
            Inbound::Upload {
                status: "ready".into(),
                name: Some("f.txt".into())
            }
        );
        // The name echo is optional
        assert_eq!(
            decode_inbound(r#"{"type":"delete","status":"ok"}"#).unwrap(),
            Inbound::Delete {
                status: "ok".into(),
                name: None
            }
        );
    }

    #[test]
    fn rejects_malformed_frames_distinctly() {
        assert!(matches!(
            decode_inbound("not json"),
            Err(FrameError::Json(_))
        ));
        assert!(matches!(
            decode_inbound(r#"{"data":"x"}"#),
            Err(FrameError::MissingType)
        ));
        assert!(matches!(
            decode_inbound(r#"{"type":42}"#),
            Err(FrameError::MissingType)
        ));
        assert!(matches!(
            decode_inbound(r#"{"type":"telemetry","data":1}"#),
            Err(FrameError::UnknownType(t)) if t == "telemetry"
        ));
        assert!(matches!(
            decode_inbound(r#"{"type":"fileList","paths":"nope"}"#),
            Err(FrameError::Payload { msg_type, .. }) if msg_type == "fileList"
        ));
    }

    #[test]
    fn accepts_valid_device_paths() {
        for path in ["/a", "/hello.txt", "/www/index.html"] {
            assert_eq!(validate_device_path(path), Ok(()), "{path}");
        }
        // Exactly at the device limit
        let max = format!("/{}", "x".repeat(MAX_PATH_BYTES - 1));
        assert_eq!(validate_device_path(&max), Ok(()));
    }

    #[test]
    fn rejects_invalid_device_paths() {
        assert_eq!(validate_device_path(""), Err(PathError::Empty));
        assert_eq!(validate_device_path("f.txt"), Err(PathError::NotAbsolute));
        assert_eq!(validate_device_path("/dir/"), Err(PathError::TrailingSlash));
        assert_eq!(validate_device_path("/"), Err(PathError::TrailingSlash));
        let long = format!("/{}", "x".repeat(MAX_PATH_BYTES));
        assert_eq!(
            validate_device_path(&long),
            Err(PathError::TooLong(MAX_PATH_BYTES + 1))
        );
    }
}
