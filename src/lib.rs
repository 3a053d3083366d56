//! # hoval-gw - A CAN Bus to MQTT Gateway for Hoval Heating Systems
//!
//! The hoval-gw crate listens to the CAN bus of a Hoval heating system, decodes
//! the datapoint values the devices exchange and publishes them to an MQTT
//! broker. Write requests received from the broker are turned into GET and SET
//! requests on the bus.
//!
//! ## Features
//!
//! - Decode the arbitration identifier layout (message kind, priority, device type, device id)
//! - Reassemble multi-frame responses keyed by their session byte
//! - Decode datapoint values by their declared type (signed, unsigned, list, string)
//! - Enforce per-datapoint limits before publishing
//! - Poll periodic datapoints of every discovered device
//! - Replay recorded `candump` traces instead of a live bus
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use hoval_gw::{
//!     build_arbitration_id, CanFrame, DataType, Datapoint, DatapointRegistry, ResponseParser, Value,
//! };
//!
//! let registry = DatapointRegistry::from_definitions(vec![Datapoint {
//!     name: "outside_temperature".into(),
//!     function_group: 0,
//!     function_number: 0,
//!     datapoint_id: 0,
//!     datatype: DataType::Signed { bits: 16, factor: 10 },
//!     limits: None,
//!     periodic: true,
//!     unit: Some("°C".into()),
//! }])
//! .unwrap();
//! let mut parser = ResponseParser::new(Arc::new(registry));
//!
//! let frame = CanFrame::new(
//!     build_arbitration_id(0x1F, 0, 8, 1),
//!     &[0x00, 0x42, 0x00, 0x00, 0x00, 0x00, 0x00, 0x41],
//! )
//! .unwrap();
//! let parsed = parser.parse(&frame).unwrap();
//! assert_eq!(parsed.value, Value::Decimal(6.5));
//! ```

pub mod bridge;
pub mod can;
pub mod constants;
pub mod datapoint;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod payload;
pub mod protocol;
pub mod settings;
pub mod util;

pub use crate::error::{GatewayError, Result};
pub use crate::logging::init_logger;

// Core protocol types
pub use protocol::{
    build_arbitration_id, build_request, ArbitrationId, CanFrame, Device, OneTimeRequest,
    Operation, ParsedMessage, PeriodicRequest, ResponseParser,
};

// Datapoints and their values
pub use datapoint::{Datapoint, DatapointRegistry, Limits};
pub use payload::{probe, DataType, ListState, Probe, Value};

// Transports and the gateway itself
pub use bridge::Bridge;
pub use can::{open_bus, BusSource, FrameReceiver, FrameSender};
pub use mqtt::{LogPublisher, MqttPublisher, Publisher, WriteRequest};
pub use settings::{load_env_file, Settings};
