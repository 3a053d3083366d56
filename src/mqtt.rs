//! # MQTT Adapter
//!
//! Publishes decoded readings and receives write requests.
//!
//! Readings go to `{topic}/{device_type}/{device_id}/{datapoint}` as JSON:
//!
//! ```json
//! {"value": 21.5, "unit": "°C", "function_group": 1, "function_number": 0,
//!  "datapoint_id": 7, "timestamp": "2024-01-01T00:00:00Z"}
//! ```
//!
//! Write requests are read from `{topic}/set`:
//!
//! ```json
//! {"device_type": 8, "device_id": 1, "datapoint": "room_setpoint", "value": 21.5}
//! ```
//!
//! `operation` may be `"set"` (default) or `"get"`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{GatewayError, Result};
use crate::payload::Value;
use crate::protocol::{Device, Operation, ParsedMessage};
use crate::settings::{MqttConnection, MqttSettings};

const REQUEST_QUEUE: usize = 32;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Sink for decoded readings.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// Topic a reading is published to.
pub fn publication_topic(root: &str, parsed: &ParsedMessage) -> String {
    format!(
        "{root}/{}/{}/{}",
        parsed.device.device_type, parsed.device.device_id, parsed.datapoint.name
    )
}

/// Topic write requests are read from.
pub fn request_topic(root: &str) -> String {
    format!("{root}/set")
}

#[derive(Debug, Serialize)]
struct Reading<'a> {
    value: &'a Value,
    unit: Option<&'a str>,
    function_group: u8,
    function_number: u8,
    datapoint_id: u16,
    timestamp: DateTime<Utc>,
}

/// JSON payload of a reading.
pub fn reading_payload(parsed: &ParsedMessage, timestamp: DateTime<Utc>) -> Result<Vec<u8>> {
    let reading = Reading {
        value: &parsed.value,
        unit: parsed.datapoint.unit.as_deref(),
        function_group: parsed.datapoint.function_group,
        function_number: parsed.datapoint.function_number,
        datapoint_id: parsed.datapoint.datapoint_id,
        timestamp,
    };
    serde_json::to_vec(&reading).map_err(|e| GatewayError::Mqtt(e.to_string()))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RequestKind {
    #[default]
    Set,
    Get,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWriteRequest {
    device_type: u8,
    device_id: u8,
    datapoint: String,
    #[serde(default)]
    operation: RequestKind,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

/// A request received from the broker, addressed to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub device: Device,
    pub datapoint: String,
    pub operation: Operation,
    /// Always present for SET requests.
    pub value: Option<Value>,
}

impl WriteRequest {
    pub fn from_json(payload: &[u8]) -> Result<WriteRequest> {
        let raw: RawWriteRequest = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::InvalidWriteRequest(e.to_string()))?;
        let operation = match raw.operation {
            RequestKind::Set => Operation::SetRequest,
            RequestKind::Get => Operation::GetRequest,
        };
        let value = raw.value.as_ref().map(json_to_value).transpose()?;
        if operation == Operation::SetRequest && value.is_none() {
            return Err(GatewayError::InvalidWriteRequest(format!(
                "set request for {} without value",
                raw.datapoint
            )));
        }
        Ok(WriteRequest {
            device: Device::new(raw.device_id, raw.device_type),
            datapoint: raw.datapoint,
            operation,
            value,
        })
    }
}

fn json_to_value(json: &serde_json::Value) -> Result<Value> {
    match json {
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Value::Integer(i)),
            (None, Some(f)) => Ok(Value::Decimal(f)),
            _ => Err(GatewayError::InvalidWriteRequest(format!("unsupported number {n}"))),
        },
        serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
        serde_json::Value::Bool(b) => Ok(Value::Integer(i64::from(*b))),
        other => Err(GatewayError::InvalidWriteRequest(format!(
            "unsupported value {other}"
        ))),
    }
}

/// Publisher backed by a broker connection.
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Connects to the broker and subscribes to the request topic.
    ///
    /// Returns the publisher, the stream of parsed write requests and the
    /// task driving the connection. The connection is re-established and the
    /// subscription renewed whenever the broker drops it.
    pub fn connect(
        settings: &MqttSettings,
    ) -> Result<(MqttPublisher, mpsc::Receiver<WriteRequest>, JoinHandle<()>)> {
        let connection = settings.connection.as_ref().ok_or_else(|| {
            GatewayError::Mqtt("no broker configured while MQTT is enabled".into())
        })?;
        let (client, eventloop) = AsyncClient::new(mqtt_options(connection), REQUEST_QUEUE);
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        let task = tokio::spawn(drive(
            eventloop,
            client.clone(),
            request_topic(&settings.topic),
            tx,
        ));
        info!(
            "Connecting to MQTT broker {}:{} as {}",
            connection.broker, connection.port, connection.name
        );
        Ok((MqttPublisher { client }, rx, task))
    }
}

fn mqtt_options(connection: &MqttConnection) -> MqttOptions {
    let mut options = MqttOptions::new(&connection.name, &connection.broker, connection.port);
    options.set_keep_alive(Duration::from_secs(30));
    if let Some(credentials) = &connection.credentials {
        options.set_credentials(
            credentials.username.clone(),
            credentials.password.as_str().to_owned(),
        );
    }
    options
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    request_topic: String,
    requests: mpsc::Sender<WriteRequest>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected, subscribing to {request_topic}");
                if let Err(e) = client.try_subscribe(request_topic.as_str(), QoS::AtLeastOnce) {
                    error!("Subscription to {request_topic} failed: {e}");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic != request_topic {
                    continue;
                }
                match WriteRequest::from_json(&publish.payload) {
                    Ok(request) => {
                        debug!("Write request received: {request:?}");
                        if requests.send(request).await.is_err() {
                            debug!("Write request consumer gone, stopping MQTT loop");
                            return;
                        }
                    }
                    Err(e) => warn!("Dropping message on {request_topic}: {e}"),
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                info!("MQTT broker closed the connection");
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT connection error: {e}, retrying in {RECONNECT_DELAY:?}");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| GatewayError::Mqtt(e.to_string()))
    }

    async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| GatewayError::Mqtt(e.to_string()))
    }
}

/// Publisher used when MQTT is disabled: readings are only logged.
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        info!("{topic}: {}", String::from_utf8_lossy(&payload));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::datapoint::Datapoint;
    use crate::payload::DataType;

    fn parsed() -> ParsedMessage {
        ParsedMessage {
            device: Device::new(1, 8),
            datapoint: Arc::new(Datapoint {
                name: "flow_temperature".into(),
                function_group: 1,
                function_number: 0,
                datapoint_id: 7,
                datatype: DataType::Signed { bits: 16, factor: 10 },
                limits: None,
                periodic: true,
                unit: Some("°C".into()),
            }),
            operation: Operation::Response,
            value: Value::Decimal(21.5),
        }
    }

    #[test]
    fn test_publication_topic() {
        assert_eq!(
            publication_topic("hoval-gw", &parsed()),
            "hoval-gw/8/1/flow_temperature"
        );
    }

    #[test]
    fn test_reading_payload() {
        let timestamp = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let payload = reading_payload(&parsed(), timestamp).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["value"], 21.5);
        assert_eq!(json["unit"], "°C");
        assert_eq!(json["function_group"], 1);
        assert_eq!(json["datapoint_id"], 7);
        assert_eq!(json["timestamp"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_write_request_defaults_to_set() {
        let request = WriteRequest::from_json(
            br#"{"device_type": 8, "device_id": 1, "datapoint": "room_setpoint", "value": 21.5}"#,
        )
        .unwrap();
        assert_eq!(request.device, Device::new(1, 8));
        assert_eq!(request.operation, Operation::SetRequest);
        assert_eq!(request.value, Some(Value::Decimal(21.5)));
    }

    #[test]
    fn test_get_request_without_value() {
        let request = WriteRequest::from_json(
            br#"{"device_type": 8, "device_id": 1, "datapoint": "room_setpoint", "operation": "get"}"#,
        )
        .unwrap();
        assert_eq!(request.operation, Operation::GetRequest);
        assert_eq!(request.value, None);
    }

    #[test]
    fn test_set_without_value_rejected() {
        assert!(matches!(
            WriteRequest::from_json(br#"{"device_type": 8, "device_id": 1, "datapoint": "x"}"#),
            Err(GatewayError::InvalidWriteRequest(_))
        ));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            WriteRequest::from_json(b"not json"),
            Err(GatewayError::InvalidWriteRequest(_))
        ));
        assert!(matches!(
            WriteRequest::from_json(
                br#"{"device_type": 300, "device_id": 1, "datapoint": "x", "value": 1}"#
            ),
            Err(GatewayError::InvalidWriteRequest(_))
        ));
    }
}
