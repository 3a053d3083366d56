//! The protocol module contains the wire-level pieces of the Hoval CAN
//! protocol: the arbitration identifier layout, the message header, the
//! reassembly of multi-frame responses and the construction of outbound
//! requests.

pub mod arbitration;
pub mod builder;
pub mod envelope;
pub mod frame;
pub mod reassembler;
pub mod request;

pub use arbitration::{build_arbitration_id, request_arbitration_id, ArbitrationId};
pub use builder::{build_request, OutboundMessage};
pub use envelope::{parse_header, Device, MessageHeader, Operation};
pub use frame::CanFrame;
pub use reassembler::{ParsedMessage, ResponseParser};
pub use request::{OneTimeRequest, PeriodicRequest};
