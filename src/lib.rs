//! Emberlink - async controller for the WebSocket console of ESP32-class
//! embedded devices
//!
//! One persistent duplex channel to the device multiplexes four
//! request/response exchanges: command-line execution, file-listing
//! retrieval, two-phase file upload, and file deletion. This crate is the
//! controller for that channel: the connection lifecycle, the dispatch of
//! inbound messages by type, and the upload handshake state machine.
//! Rendering, editing, and dialogs belong to the embedding UI, which calls
//! the controller's operations and consumes its [`LinkEvent`] stream.
//!
//! ```no_run
//! use emberlink::{DeviceLink, LinkConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (link, mut events) = DeviceLink::connect(LinkConfig::new("ws://esp.local/ws")).await?;
//! link.catalog().refresh().await?;
//! link.cli().send_command("WORDS").await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod controller;
pub mod events;
pub mod protocol;
pub mod transport;
pub mod upload;

pub use catalog::{CatalogError, FileCatalog};
pub use cli::{CliError, CliSession};
pub use config::LinkConfig;
pub use controller::DeviceLink;
pub use events::LinkEvent;
pub use protocol::{
    validate_device_path, FrameError, Inbound, Outbound, PathError, MAX_PATH_BYTES,
    MAX_TEXT_FRAME_BYTES, SUBPROTOCOL,
};
pub use transport::{LinkSignal, TransportError, Wire, WsLink};
pub use upload::{FileSource, UploadError, UploadSession, UploadSource};
