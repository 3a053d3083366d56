//! # Outbound Message Builder
//!
//! Builds the single-frame requests the gateway puts on the bus:
//!
//! ```text
//! | 0x01 | operation | group | number | id hi | id lo | value ... |
//! ```
//!
//! Header and value must fit into one 8-byte CAN frame. Multi-frame outbound
//! messages are not supported; an oversized request fails instead of being
//! truncated.

use bytes::{BufMut, BytesMut};

use crate::constants::{CAN_MAX_DLC, OUTBOUND_HEADER_LEN, OUTBOUND_MESSAGE_LEN};
use crate::datapoint::Datapoint;
use crate::error::{GatewayError, Result};
use crate::protocol::envelope::Operation;
use crate::protocol::frame::CanFrame;

/// An outbound message under construction.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    arbitration_id: u32,
    operation: Operation,
    header: [u8; OUTBOUND_HEADER_LEN],
    data: BytesMut,
}

impl OutboundMessage {
    pub fn new(arbitration_id: u32, operation: Operation, datapoint: &Datapoint) -> Self {
        let [id_hi, id_lo] = datapoint.id_bytes();
        OutboundMessage {
            arbitration_id,
            operation,
            header: [
                OUTBOUND_MESSAGE_LEN,
                operation.code(),
                datapoint.function_group,
                datapoint.function_number,
                id_hi,
                id_lo,
            ],
            data: BytesMut::with_capacity(CAN_MAX_DLC - OUTBOUND_HEADER_LEN),
        }
    }

    /// Appends already-encoded value bytes.
    pub fn put_data(&mut self, data: &[u8]) -> &mut Self {
        self.data.put_slice(data);
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Total size of header and payload.
    pub fn size(&self) -> usize {
        self.header.len() + self.data.len()
    }

    /// Produces the CAN frame, failing with `FrameTooLarge` above 8 bytes.
    pub fn to_can_frame(&self) -> Result<CanFrame> {
        if self.size() > CAN_MAX_DLC {
            return Err(GatewayError::FrameTooLarge {
                size: self.size(),
                max: CAN_MAX_DLC,
            });
        }
        let mut payload = Vec::with_capacity(self.size());
        payload.extend_from_slice(&self.header);
        payload.extend_from_slice(&self.data);
        CanFrame::new(self.arbitration_id, &payload)
    }
}

/// Builds a single request frame for `datapoint`.
pub fn build_request(
    arbitration_id: u32,
    operation: Operation,
    datapoint: &Datapoint,
    payload: &[u8],
) -> Result<CanFrame> {
    OutboundMessage::new(arbitration_id, operation, datapoint)
        .put_data(payload)
        .to_can_frame()
}
