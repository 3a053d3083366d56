//! # Message Envelope
//!
//! The header model shared by inbound and outbound messages: the device a
//! message belongs to, the operation it carries and the number of
//! continuation frames it announces.

use std::fmt;

use nom::{number::complete::be_u8, IResult};
use serde::{Deserialize, Serialize};

use crate::constants::{
    HEADER_LENGTH_SHIFT, OPERATION_GET_REQUEST, OPERATION_RESPONSE, OPERATION_SET_REQUEST,
};
use crate::error::GatewayError;

/// Operations carried in byte 1 of a first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Response,
    GetRequest,
    SetRequest,
}

impl Operation {
    pub fn code(&self) -> u8 {
        match self {
            Operation::Response => OPERATION_RESPONSE,
            Operation::GetRequest => OPERATION_GET_REQUEST,
            Operation::SetRequest => OPERATION_SET_REQUEST,
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = GatewayError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            OPERATION_RESPONSE => Ok(Operation::Response),
            OPERATION_GET_REQUEST => Ok(Operation::GetRequest),
            OPERATION_SET_REQUEST => Ok(Operation::SetRequest),
            other => Err(GatewayError::UnknownOperation(other)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Response => "RESPONSE",
            Operation::GetRequest => "GET_REQUEST",
            Operation::SetRequest => "SET_REQUEST",
        };
        f.write_str(name)
    }
}

/// A physical device on the bus. Only id and type together identify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Device {
    pub device_id: u8,
    pub device_type: u8,
}

impl Device {
    pub fn new(device_id: u8, device_type: u8) -> Self {
        Device {
            device_id,
            device_type,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id: {} / Type: {}", self.device_id, self.device_type)
    }
}

/// The first two payload bytes of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Number of continuation frames that follow a first frame.
    pub declared_length: u8,
    /// Raw operation byte. Only meaningful on first frames.
    pub operation_id: u8,
    /// Byte 0 as received, used as session key.
    pub session_key: u8,
}

impl MessageHeader {
    pub fn operation(&self) -> Result<Operation, GatewayError> {
        Operation::try_from(self.operation_id)
    }
}

/// Parses the header bytes of a frame payload.
pub fn parse_header(input: &[u8]) -> IResult<&[u8], MessageHeader> {
    let (input, session_key) = be_u8(input)?;
    let (input, operation_id) = be_u8(input)?;
    Ok((
        input,
        MessageHeader {
            declared_length: session_key >> HEADER_LENGTH_SHIFT,
            operation_id,
            session_key,
        },
    ))
}
