//! HTTP OTA update client with validate-before-commit semantics.
//!
//! This crate negotiates an over-the-air update with an update server and
//! streams the payload into device flash behind a staged, checksum-gated
//! transaction. The server chooses between a firmware image and an auxiliary
//! dataset image via response headers; the client validates the declared
//! metadata and, for firmware, the image's magic header before a single byte
//! is committed, so a corrupt or wrong-kind payload can never become the
//! active image. A server answering `412 Precondition Failed` signals the
//! device is already current, which is a normal terminal state rather than
//! an error.
//!
//! ```ignore
//! use ota_updater::{
//!     DeviceProfile, FileFlashWriter, HttpTransport, Outcome, PassiveNetworkStack,
//!     UpdateLocator, UpdateOrchestrator, UpdateRequest,
//! };
//!
//! # async fn demo() {
//! let request = UpdateRequest::new(
//!     UpdateLocator::from_host("updates.example", 8266, "/check"),
//!     DeviceProfile {
//!         device_id: "24:6f:28:aa:bb:cc".into(),
//!         firmware_version: env!("CARGO_PKG_VERSION").into(),
//!         dataset_version: "2024-11-02".into(),
//!         flash_capacity: 4 * 1024 * 1024,
//!         free_update_space: 2 * 1024 * 1024,
//!     },
//! );
//!
//! let mut orchestrator = UpdateOrchestrator::new(
//!     HttpTransport::builder().build(),
//!     FileFlashWriter::new("/var/lib/ota"),
//!     PassiveNetworkStack,
//! );
//!
//! match orchestrator.attempt_update(&request).await {
//!     Outcome::SuccessFirmware => println!("firmware updated, reboot to apply"),
//!     Outcome::SuccessDataset => println!("dataset updated"),
//!     Outcome::UpToDate => println!("already at the latest versions"),
//!     Outcome::Failure(_) => {
//!         eprintln!("update failed: {}", orchestrator.last_error_string());
//!     }
//! }
//! # }
//! ```

mod classifier;
mod error;
mod flash;
mod request;
mod response;
mod transport;
mod updater;

pub use classifier::{
    classify_firmware, flash_size_class, MagicError, FIRMWARE_MAGIC, MAGIC_HEADER_LEN,
};
pub use error::{TransportError, TransportResult, UpdateError};
pub use flash::{FileFlashWriter, FlashWriter};
pub use request::{DeviceProfile, UpdateLocator, UpdateRequest};
pub use response::{FlashRegion, ResponseMetadata, UpdateKind};
pub use transport::{
    BufferedPayload, HttpTransport, HttpTransportBuilder, NetworkStack, PassiveNetworkStack,
    PayloadSource, UpdateExchange, UpdateTransport, REQUEST_TIMEOUT, USER_AGENT,
};
pub use updater::{Outcome, UpdateOrchestrator, SETTLE_DELAY};
