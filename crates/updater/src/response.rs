use std::fmt;

use serde::{Deserialize, Serialize};

/// Status codes with protocol-defined meaning.
pub(crate) mod status {
    /// Payload present.
    pub const OK: u16 = 200;
    /// The client's declared versions already match the server's.
    pub const PRECONDITION_FAILED: u16 = 412;
}

/// Response facts the orchestrator validates, extracted once per attempt.
///
/// Only the two whitelisted headers are retained; everything else the server
/// sends is dropped at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMetadata {
    /// HTTP status code.
    pub status: u16,
    /// Declared body length in bytes; zero or negative means absent.
    pub content_length: i64,
    /// Raw `X-Update-Type` header, if present.
    pub update_type: Option<String>,
    /// Raw `X-Md5` header, if present.
    pub content_checksum: Option<String>,
}

/// Kind of image the server is offering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    #[serde(rename = "firmware")]
    Firmware,
    #[serde(rename = "dataset")]
    Dataset,
}

impl UpdateKind {
    /// Parse the wire value. Case-sensitive: the server must send the exact
    /// token.
    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "firmware" => Some(Self::Firmware),
            "dataset" => Some(Self::Dataset),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Firmware => "firmware",
            Self::Dataset => "dataset",
        }
    }

    /// Flash region this kind of image is committed to.
    pub fn region(&self) -> FlashRegion {
        match self {
            Self::Firmware => FlashRegion::Firmware,
            Self::Dataset => FlashRegion::Dataset,
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Flash region a write transaction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashRegion {
    /// The executable firmware image slot.
    Firmware,
    /// The auxiliary dataset slot.
    Dataset,
}
