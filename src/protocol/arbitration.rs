//! # Arbitration Identifier Codec
//!
//! The 29-bit extended CAN identifier is overloaded to carry four byte-wide
//! fields:
//!
//! ```text
//!  31      24 23      16 15       8 7        0
//! +----------+----------+----------+----------+
//! |   kind   | priority |  device  |  device  |
//! |          |          |   type   |    id    |
//! +----------+----------+----------+----------+
//! ```
//!
//! A kind of `0x1F` marks a first (or only) frame; any other value marks a
//! continuation frame.

use crate::constants::{FIRST_FRAME_KIND, REQUEST_PRIORITY};
use crate::protocol::envelope::Device;

/// The decoded fields of an arbitration identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArbitrationId {
    pub message_kind: u8,
    pub priority: u8,
    pub device_type: u8,
    pub device_id: u8,
}

impl ArbitrationId {
    pub fn new(message_kind: u8, priority: u8, device_type: u8, device_id: u8) -> Self {
        ArbitrationId {
            message_kind,
            priority,
            device_type,
            device_id,
        }
    }

    /// Identifier used for requests the gateway sends to `device`.
    pub fn request(device: Device) -> Self {
        Self::decode(request_arbitration_id(device))
    }

    /// Splits a raw identifier into its fields. Total, never fails.
    pub fn decode(raw: u32) -> Self {
        ArbitrationId {
            message_kind: (raw >> 24) as u8,
            priority: (raw >> 16) as u8,
            device_type: (raw >> 8) as u8,
            device_id: raw as u8,
        }
    }

    /// Packs the fields into a raw identifier.
    pub fn encode(&self) -> u32 {
        build_arbitration_id(
            self.message_kind,
            self.priority,
            self.device_type,
            self.device_id,
        )
    }

    pub fn is_first_frame(&self) -> bool {
        self.message_kind == FIRST_FRAME_KIND
    }

    /// The device the identifier names.
    pub fn device(&self) -> Device {
        Device::new(self.device_id, self.device_type)
    }
}

impl From<u32> for ArbitrationId {
    fn from(raw: u32) -> Self {
        Self::decode(raw)
    }
}

/// Packs the four fields of an arbitration identifier.
pub fn build_arbitration_id(message_kind: u8, priority: u8, device_type: u8, device_id: u8) -> u32 {
    ((message_kind as u32) << 24)
        | ((priority as u32) << 16)
        | ((device_type as u32) << 8)
        | device_id as u32
}

/// Raw identifier for a request addressed to `device`.
pub fn request_arbitration_id(device: Device) -> u32 {
    ((REQUEST_PRIORITY as u32) << 16) | ((device.device_type as u32) << 8) | device.device_id as u32
}
