//! # CAN Frame
//!
//! The transport-independent frame exchanged between the bus adapters and
//! the protocol layer: a 29-bit extended identifier and up to 8 data bytes.

use std::fmt;

use crate::constants::CAN_MAX_DLC;
use crate::error::GatewayError;
use crate::protocol::arbitration::ArbitrationId;

/// Represents a CAN data frame with an extended identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    id: u32,
    data: Vec<u8>,
}

impl CanFrame {
    /// Creates a frame, rejecting payloads longer than 8 bytes.
    pub fn new(id: u32, data: &[u8]) -> Result<Self, GatewayError> {
        if data.len() > CAN_MAX_DLC {
            return Err(GatewayError::FrameTooLarge {
                size: data.len(),
                max: CAN_MAX_DLC,
            });
        }
        Ok(CanFrame {
            id,
            data: data.to_vec(),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn arbitration_id(&self) -> ArbitrationId {
        ArbitrationId::decode(self.id)
    }
}

/// Formats the frame the way `candump` logs it, e.g. `1FE0080A#0140030400050A`.
impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}#{}", self.id, hex::encode_upper(&self.data))
    }
}
