//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hoval_gw::{
    build_arbitration_id, CanFrame, DataType, Datapoint, DatapointRegistry, GatewayError, Limits,
    ListState, Publisher, Result,
};

/// Publisher that records every publication.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, serde_json::Value)>>,
    disconnected: AtomicBool,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        let publisher = RecordingPublisher::default();
        publisher.fail.store(true, Ordering::SeqCst);
        publisher
    }

    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().unwrap().clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Mqtt("broker unreachable".into()));
        }
        let json = serde_json::from_slice(&payload).unwrap();
        self.published.lock().unwrap().push((topic.to_string(), json));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn datapoint(
    name: &str,
    key: (u8, u8, u16),
    datatype: DataType,
    limits: Option<(f64, f64)>,
    periodic: bool,
) -> Datapoint {
    Datapoint {
        name: name.into(),
        function_group: key.0,
        function_number: key.1,
        datapoint_id: key.2,
        datatype,
        limits: limits.map(|(lower, upper)| Limits { lower, upper }),
        periodic,
        unit: None,
    }
}

/// A small heating-system registry.
pub fn registry() -> Arc<DatapointRegistry> {
    Arc::new(
        DatapointRegistry::from_definitions(vec![
            datapoint(
                "flow_temperature",
                (1, 0, 7),
                DataType::Signed { bits: 16, factor: 10 },
                Some((0.0, 90.0)),
                true,
            ),
            datapoint(
                "burner_starts",
                (3, 4, 5),
                DataType::Unsigned { bits: 16, factor: 1 },
                None,
                false,
            ),
            datapoint(
                "room_setpoint",
                (1, 0, 2),
                DataType::Signed { bits: 16, factor: 10 },
                Some((5.0, 30.0)),
                true,
            ),
            datapoint(
                "operating_mode",
                (1, 0, 3),
                DataType::List {
                    bits: 8,
                    states: vec![
                        ListState { value: 0, label: "standby".into() },
                        ListState { value: 1, label: "week_1".into() },
                        ListState { value: 2, label: "constant".into() },
                    ],
                },
                None,
                false,
            ),
        ])
        .unwrap(),
    )
}

/// First (or only) frame sent by a device.
pub fn first_frame(device_type: u8, device_id: u8, data: &[u8]) -> CanFrame {
    CanFrame::new(build_arbitration_id(0x1F, 0, device_type, device_id), data).unwrap()
}

/// Continuation frame sent by a device.
pub fn continuation_frame(device_type: u8, device_id: u8, data: &[u8]) -> CanFrame {
    CanFrame::new(build_arbitration_id(0x0A, 0, device_type, device_id), data).unwrap()
}
