//! Structural validation of firmware payloads.
//!
//! Firmware images open with a fixed 4-byte header: a magic sentinel in byte
//! 0 and a flash-size class in the high nibble of byte 3. Dataset payloads
//! carry no such convention and are never classified.

use thiserror::Error;

use crate::error::UpdateError;
use crate::transport::PayloadSource;

/// First byte of every valid firmware image.
pub const FIRMWARE_MAGIC: u8 = 0xE9;

/// Length of the lookahead used to classify a firmware payload.
pub const MAGIC_HEADER_LEN: usize = 4;

/// Rejections produced while classifying a firmware payload.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicError {
    /// The body did not yield a full header of lookahead bytes.
    #[error("unable to peek 4 header bytes")]
    PeekFailed,
    /// Byte 0 was not the firmware sentinel.
    #[error("invalid magic byte 0x{0:02x}")]
    InvalidMagic(u8),
    /// The image was built for a larger flash chip than this device carries.
    /// Flashing it anyway would let the image overrun the device's own code
    /// region on boot.
    #[error("image declares {image} bytes of flash, device has {device}")]
    SizeMismatch { image: u64, device: u64 },
}

impl From<MagicError> for UpdateError {
    fn from(err: MagicError) -> Self {
        match err {
            MagicError::PeekFailed => UpdateError::MagicPeekFailed,
            MagicError::InvalidMagic(_) => UpdateError::InvalidMagicBytes,
            MagicError::SizeMismatch { .. } => UpdateError::MagicSizeMismatch,
        }
    }
}

/// Flash capacity encoded by a size-class nibble.
///
/// Unrecognized classes resolve to zero, which no capacity check rejects;
/// the device runtime this table mirrors behaves the same way.
pub fn flash_size_class(nibble: u8) -> u64 {
    match nibble & 0x0f {
        0x0 => 512 * 1024,
        0x1 => 256 * 1024,
        0x2 => 1024 * 1024,
        0x3 => 2 * 1024 * 1024,
        0x4 => 4 * 1024 * 1024,
        0x8 => 8 * 1024 * 1024,
        0x9 => 16 * 1024 * 1024,
        _ => 0,
    }
}

/// Validate a firmware payload without consuming body bytes.
///
/// Peeks the 4-byte image header, checks the magic sentinel, and verifies
/// the declared flash-size class fits the device's capacity. The source's
/// read position is left untouched so the full image can still stream to
/// flash afterwards.
pub async fn classify_firmware(
    source: &mut dyn PayloadSource,
    device_capacity: u64,
) -> Result<(), MagicError> {
    let mut header = [0u8; MAGIC_HEADER_LEN];
    match source.peek(&mut header).await {
        Ok(n) if n == MAGIC_HEADER_LEN => {}
        _ => return Err(MagicError::PeekFailed),
    }

    if header[0] != FIRMWARE_MAGIC {
        return Err(MagicError::InvalidMagic(header[0]));
    }

    let image = flash_size_class(header[3] >> 4);
    if image > device_capacity {
        return Err(MagicError::SizeMismatch {
            image,
            device: device_capacity,
        });
    }

    Ok(())
}
