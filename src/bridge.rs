//! # Bridge
//!
//! Connects the bus to the broker with three loops running concurrently on
//! one task:
//!
//! - the inbound loop reads frames, feeds them to the [`ResponseParser`] and
//!   publishes every completed RESPONSE;
//! - the periodic loop arms the recurring GET requests of every device the
//!   inbound loop discovers (live bus only);
//! - the write loop turns write requests received from the broker into
//!   single requests on the bus.
//!
//! The parser, and with it the pending and device tables, is owned by the
//! inbound loop alone. Discovered devices reach the periodic loop over a
//! channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::can::{FrameReceiver, FrameSender};
use crate::datapoint::DatapointRegistry;
use crate::error::{GatewayError, Result};
use crate::logging::{log_frame_hex, LogThrottle};
use crate::mqtt::{publication_topic, reading_payload, Publisher, WriteRequest};
use crate::protocol::{Device, OneTimeRequest, ParsedMessage, PeriodicRequest, ResponseParser};
use crate::settings::BridgeSettings;

/// The gateway between one bus and one broker.
pub struct Bridge {
    registry: Arc<DatapointRegistry>,
    sender: Arc<dyn FrameSender>,
    receiver: Box<dyn FrameReceiver>,
    publisher: Arc<dyn Publisher>,
    requests: Option<mpsc::Receiver<WriteRequest>>,
    topic: String,
    settings: BridgeSettings,
    poll: bool,
}

impl Bridge {
    /// Creates a bridge that polls discovered devices and accepts no write
    /// requests until [`with_requests`](Self::with_requests) is called.
    pub fn new(
        registry: Arc<DatapointRegistry>,
        sender: Arc<dyn FrameSender>,
        receiver: Box<dyn FrameReceiver>,
        publisher: Arc<dyn Publisher>,
        topic: impl Into<String>,
        settings: BridgeSettings,
    ) -> Self {
        Bridge {
            registry,
            sender,
            receiver,
            publisher,
            requests: None,
            topic: topic.into(),
            settings,
            poll: true,
        }
    }

    pub fn with_requests(mut self, requests: mpsc::Receiver<WriteRequest>) -> Self {
        self.requests = Some(requests);
        self
    }

    /// Periodic polling only makes sense on a live bus.
    pub fn with_periodic_polling(mut self, enabled: bool) -> Self {
        self.poll = enabled;
        self
    }

    /// Runs until `shutdown` completes, the bus ends or the bus fails.
    ///
    /// The bus is closed and the broker disconnected in every case. The end
    /// of a replayed trace is a clean stop.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Bridge {
            registry,
            sender,
            receiver,
            publisher,
            requests,
            topic,
            settings,
            poll,
        } = self;

        let mut parser = ResponseParser::new(registry.clone());
        if let Some(timeout) = settings.pending_timeout {
            parser = parser.with_pending_timeout(timeout);
        }
        let (device_tx, device_rx) = mpsc::unbounded_channel();

        let inbound = inbound_loop(receiver, parser, publisher.as_ref(), &topic, device_tx);
        let background = async {
            tokio::join!(
                periodic_loop(
                    device_rx,
                    sender.as_ref(),
                    registry.clone(),
                    settings.poll_interval,
                    poll
                ),
                write_loop(requests, sender.as_ref(), registry.clone()),
            );
            std::future::pending::<()>().await
        };

        let outcome = tokio::select! {
            result = inbound => result,
            _ = background => Ok(()),
            _ = shutdown => {
                info!("Program exit..");
                Ok(())
            }
        };

        if let Err(e) = sender.close().await {
            error!("Closing the bus failed: {e}");
        }
        if let Err(e) = publisher.disconnect().await {
            error!("Disconnecting from the broker failed: {e}");
        }
        outcome
    }
}

async fn inbound_loop(
    mut receiver: Box<dyn FrameReceiver>,
    mut parser: ResponseParser,
    publisher: &dyn Publisher,
    topic: &str,
    devices: mpsc::UnboundedSender<Device>,
) -> Result<()> {
    let mut throttle = LogThrottle::new(Duration::from_secs(60), 5);
    loop {
        let frame = match receiver.recv().await {
            Ok(frame) => frame,
            Err(GatewayError::EndOfStream) => {
                info!("End of frame stream");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        log_frame_hex("Received", &frame);

        let parsed = parser.parse(&frame);
        for device in parser.drain_discovered() {
            // The periodic loop only stops after this loop.
            let _ = devices.send(device);
        }
        if let Some(parsed) = parsed {
            if let Err(e) = publish(publisher, topic, &parsed).await {
                if throttle.allow() {
                    error!("Publishing {} failed: {e}", parsed.datapoint.name);
                } else if throttle.suppressed() == 1 {
                    warn!("Too many publish failures, suppressing further errors for a while");
                }
            }
        }
    }
}

async fn publish(publisher: &dyn Publisher, topic: &str, parsed: &ParsedMessage) -> Result<()> {
    let topic = publication_topic(topic, parsed);
    let payload = reading_payload(parsed, Utc::now())?;
    debug!("Publishing {} = {} to {topic}", parsed.datapoint.name, parsed.value);
    publisher.publish(&topic, payload).await
}

async fn periodic_loop(
    mut devices: mpsc::UnboundedReceiver<Device>,
    sender: &dyn FrameSender,
    registry: Arc<DatapointRegistry>,
    interval: Duration,
    enabled: bool,
) {
    while let Some(device) = devices.recv().await {
        if !enabled {
            continue;
        }
        let request = PeriodicRequest::new(device, registry.clone(), interval);
        if let Err(e) = request.start(sender).await {
            error!("Periodic requests for device {device} failed: {e}");
        }
    }
}

async fn write_loop(
    requests: Option<mpsc::Receiver<WriteRequest>>,
    sender: &dyn FrameSender,
    registry: Arc<DatapointRegistry>,
) {
    let Some(mut requests) = requests else {
        return;
    };
    while let Some(request) = requests.recv().await {
        let one_time = OneTimeRequest::new(
            request.device,
            request.operation,
            request.datapoint.as_str(),
            registry.clone(),
        );
        if let Err(e) = one_time.start_value(sender, request.value.as_ref()).await {
            error!(
                "{} for {} on device {} failed: {e}",
                request.operation, request.datapoint, request.device
            );
        }
    }
    debug!("Write request stream closed");
}
