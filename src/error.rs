//! # Gateway Error Handling
//!
//! This module defines the GatewayError enum, which represents the different error
//! types that can occur in the hoval-gw crate.
//!
//! `MalformedFrame`, `OutOfLimits` and `UnknownDatapoint` are recovered where they
//! occur: the offending frame or request is dropped and the bridge keeps running.
//! `FrameTooLarge` aborts the single outbound request being built.
//! `ConfigurationMissing` is fatal at startup.

use thiserror::Error;

use crate::payload::DatatypeError;

/// Represents the different error types that can occur in the gateway crate.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Indicates a frame or reassembled message that cannot be interpreted.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Indicates a decoded value outside of the datapoint's declared limits.
    #[error("Value {value} of datapoint {datapoint} is out of limits [{lower}, {upper}]")]
    OutOfLimits {
        datapoint: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    /// Indicates a datapoint absent from the registry.
    #[error("Unknown datapoint: {0}")]
    UnknownDatapoint(String),

    /// Indicates an outbound message that does not fit into a single CAN frame.
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Indicates a required setting absent from both environment and settings file.
    #[error("Variable not found in env ({env}) and settings file ({key})")]
    ConfigurationMissing { env: String, key: String },

    /// Indicates an operation code outside of the known set.
    #[error("Unknown operation: 0x{0:02X}")]
    UnknownOperation(u8),

    /// Indicates a value that cannot be encoded with the datapoint's type.
    #[error("Value encoding error: {0}")]
    ValueEncoding(String),

    /// Indicates a write request that cannot be interpreted.
    #[error("Invalid write request: {0}")]
    InvalidWriteRequest(String),

    /// Indicates an error related to the CAN bus transport.
    #[error("CAN bus error: {0}")]
    Bus(String),

    /// Indicates that a bus delivers no more frames (end of a replayed trace).
    #[error("End of frame stream")]
    EndOfStream,

    /// Indicates an error related to the MQTT broker connection.
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// Indicates an invalid settings file.
    #[error("Settings error: {0}")]
    Settings(String),

    /// Wraps an I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DatatypeError> for GatewayError {
    fn from(err: DatatypeError) -> Self {
        match err {
            DatatypeError::TooShort { .. } => GatewayError::MalformedFrame(err.to_string()),
            _ => GatewayError::ValueEncoding(err.to_string()),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GatewayError>;
