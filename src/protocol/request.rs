//! # Request Dispatchers
//!
//! [`PeriodicRequest`] arms the recurring GET polls of one device,
//! [`OneTimeRequest`] sends a single GET or SET for a named datapoint.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::can::FrameSender;
use crate::datapoint::DatapointRegistry;
use crate::error::Result;
use crate::logging::log_frame_hex;
use crate::payload::Value;
use crate::protocol::arbitration::request_arbitration_id;
use crate::protocol::builder::build_request;
use crate::protocol::envelope::{Device, Operation};
use crate::protocol::frame::CanFrame;

/// Recurring GET requests for every periodic datapoint of one device.
#[derive(Debug, Clone)]
pub struct PeriodicRequest {
    device: Device,
    arbitration_id: u32,
    registry: Arc<DatapointRegistry>,
    interval: Duration,
}

impl PeriodicRequest {
    pub fn new(device: Device, registry: Arc<DatapointRegistry>, interval: Duration) -> Self {
        PeriodicRequest {
            device,
            arbitration_id: request_arbitration_id(device),
            registry,
            interval,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn arbitration_id(&self) -> u32 {
        self.arbitration_id
    }

    /// One GET frame per periodic datapoint, in registry order.
    pub fn frames(&self) -> Result<Vec<CanFrame>> {
        self.registry
            .periodic()
            .map(|datapoint| {
                build_request(self.arbitration_id, Operation::GetRequest, datapoint, &[])
            })
            .collect()
    }

    /// Schedules every frame for recurring emission on the bus.
    ///
    /// Returns the number of scheduled frames.
    pub async fn start(&self, bus: &dyn FrameSender) -> Result<usize> {
        let frames = self.frames()?;
        for frame in &frames {
            log_frame_hex("Scheduling periodic request", frame);
            bus.send_periodic(frame.clone(), self.interval).await?;
        }
        info!(
            "Polling {} datapoints of device {} every {:?}",
            frames.len(),
            self.device,
            self.interval
        );
        Ok(frames.len())
    }
}

/// A single request for a datapoint addressed by name.
#[derive(Debug, Clone)]
pub struct OneTimeRequest {
    device: Device,
    operation: Operation,
    function_name: String,
    registry: Arc<DatapointRegistry>,
}

impl OneTimeRequest {
    pub fn new(
        device: Device,
        operation: Operation,
        function_name: impl Into<String>,
        registry: Arc<DatapointRegistry>,
    ) -> Self {
        OneTimeRequest {
            device,
            operation,
            function_name: function_name.into(),
            registry,
        }
    }

    /// Builds the request with already-encoded `data` and sends it.
    ///
    /// An unknown datapoint name is not an error: nothing is sent and
    /// `Ok(None)` is returned. A request that does not fit into one frame
    /// fails with `FrameTooLarge` before anything reaches the bus.
    pub async fn start(&self, bus: &dyn FrameSender, data: &[u8]) -> Result<Option<CanFrame>> {
        let Some(datapoint) = self.registry.lookup_by_name(&self.function_name) else {
            debug!(
                "No datapoint named {:?}, request for device {} ignored",
                self.function_name, self.device
            );
            return Ok(None);
        };
        let frame = build_request(
            request_arbitration_id(self.device),
            self.operation,
            &datapoint,
            data,
        )?;
        log_frame_hex(&format!("Sending {}", self.operation), &frame);
        bus.send(&frame).await?;
        Ok(Some(frame))
    }

    /// Encodes `value` with the datapoint's declared type, then sends it.
    ///
    /// GET requests carry no value and ignore `value`.
    pub async fn start_value(
        &self,
        bus: &dyn FrameSender,
        value: Option<&Value>,
    ) -> Result<Option<CanFrame>> {
        let Some(datapoint) = self.registry.lookup_by_name(&self.function_name) else {
            return self.start(bus, &[]).await;
        };
        let data = match (self.operation, value) {
            (Operation::GetRequest, _) | (_, None) => Vec::new(),
            (_, Some(value)) => datapoint.datatype.encode(value)?,
        };
        self.start(bus, &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::mock::MockBus;
    use crate::datapoint::Datapoint;
    use crate::error::GatewayError;
    use crate::payload::DataType;

    fn registry() -> Arc<DatapointRegistry> {
        let datapoint = |name: &str, id: u16, periodic: bool, datatype: DataType| Datapoint {
            name: name.into(),
            function_group: 1,
            function_number: 0,
            datapoint_id: id,
            datatype,
            limits: None,
            periodic,
            unit: None,
        };
        Arc::new(
            DatapointRegistry::from_definitions(vec![
                datapoint("outside_temperature", 0, true, DataType::Signed { bits: 16, factor: 10 }),
                datapoint("room_setpoint", 1, false, DataType::Signed { bits: 16, factor: 10 }),
                datapoint("flow_temperature", 2, true, DataType::Signed { bits: 16, factor: 10 }),
                datapoint("operator_note", 3, false, DataType::String),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_periodic_frames_use_request_priority() {
        let request = PeriodicRequest::new(Device::new(1, 8), registry(), Duration::from_secs(60));
        assert_eq!(request.arbitration_id(), 0x1FE0_0801);
        let frames = request.frames().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data(), &[0x01, 0x40, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(frames[1].data(), &[0x01, 0x40, 0x01, 0x00, 0x00, 0x02]);
    }

    #[tokio::test]
    async fn test_periodic_start_schedules_each_frame() {
        let (bus, _rx) = MockBus::new();
        let request = PeriodicRequest::new(Device::new(1, 8), registry(), Duration::from_secs(30));
        assert_eq!(request.start(&bus).await.unwrap(), 2);
        let periodic = bus.periodic();
        assert_eq!(periodic.len(), 2);
        assert!(periodic.iter().all(|(_, interval)| *interval == Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_one_time_set_encodes_value() {
        let (bus, _rx) = MockBus::new();
        let request =
            OneTimeRequest::new(Device::new(1, 8), Operation::SetRequest, "room_setpoint", registry());
        let frame = request
            .start_value(&bus, Some(&Value::Decimal(21.5)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.data(), &[0x01, 0x46, 0x01, 0x00, 0x00, 0x01, 0x00, 0xD7]);
        assert_eq!(bus.sent(), vec![frame]);
    }

    #[tokio::test]
    async fn test_unknown_name_is_silent() {
        let (bus, _rx) = MockBus::new();
        let request =
            OneTimeRequest::new(Device::new(1, 8), Operation::SetRequest, "no_such_point", registry());
        assert!(request.start(&bus, &[0x01]).await.unwrap().is_none());
        assert!(bus.sent().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_value_sends_nothing() {
        let (bus, _rx) = MockBus::new();
        let request =
            OneTimeRequest::new(Device::new(1, 8), Operation::SetRequest, "operator_note", registry());
        let result = request
            .start_value(&bus, Some(&Value::Text("hello".into())))
            .await;
        assert!(matches!(result, Err(GatewayError::FrameTooLarge { size: 11, max: 8 })));
        assert!(bus.sent().is_empty());
    }
}
