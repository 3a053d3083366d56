//! Hoval CAN Protocol Constants
//!
//! This module defines constants used by the gateway's protocol layer. The
//! protocol is undocumented; the values below were recovered from bus traces.

/// Message kind marking a first (or only) frame of a logical message.
pub const FIRST_FRAME_KIND: u8 = 0x1F;

/// Priority word used for every request originated by the gateway.
///
/// Shifted into bits 31..16 of the arbitration id it sets the message kind
/// to [`FIRST_FRAME_KIND`] and the priority byte to `0xE0`.
pub const REQUEST_PRIORITY: u16 = 0x1FE0;

// Operation codes (byte 1 of a first frame)
pub const OPERATION_RESPONSE: u8 = 0x42;
pub const OPERATION_GET_REQUEST: u8 = 0x40;
pub const OPERATION_SET_REQUEST: u8 = 0x46;

/// Number of bits the declared length is shifted by in header byte 0.
pub const HEADER_LENGTH_SHIFT: u8 = 3;

/// Header byte 0 of every outbound message (single frame, no continuation).
pub const OUTBOUND_MESSAGE_LEN: u8 = 1;

/// Maximum CAN data payload.
pub const CAN_MAX_DLC: usize = 8;

/// Size of the outbound header: len, operation, group, number, id hi, id lo.
pub const OUTBOUND_HEADER_LEN: usize = 6;

/// Minimum number of payload bytes carried by any inbound frame.
pub const MIN_FRAME_PAYLOAD: usize = 2;

/// Minimum reassembled message length (header up to and including datapoint id).
pub const MIN_MESSAGE_LEN: usize = 6;

/// Trailing control bytes carried by the final frame of a multi-frame message.
pub const TRAILING_CONTROL_BYTES: usize = 2;

// Offsets into a reassembled message
pub const OFFSET_FUNCTION_GROUP: usize = 2;
pub const OFFSET_FUNCTION_NUMBER: usize = 3;
pub const OFFSET_DATAPOINT_ID: usize = 4;
pub const OFFSET_VALUE: usize = 6;

// Defaults for settings
pub const DEFAULT_MQTT_TOPIC: &str = "hoval-gw";
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_CAN_INTERFACE: &str = "can0";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 10;
