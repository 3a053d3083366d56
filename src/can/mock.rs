//! In-memory bus used by tests and benchmarks.
//!
//! Frames injected with [`MockBus::inject`] are delivered by the paired
//! [`MockReceiver`]; everything sent through the bus is recorded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::can::{FrameReceiver, FrameSender};
use crate::error::{GatewayError, Result};
use crate::protocol::CanFrame;

#[derive(Default)]
struct Recorded {
    sent: Vec<CanFrame>,
    periodic: Vec<(CanFrame, Duration)>,
}

/// Sending half of the in-memory bus. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MockBus {
    recorded: Arc<Mutex<Recorded>>,
    inbound: Arc<Mutex<Option<mpsc::UnboundedSender<CanFrame>>>>,
    closed: Arc<AtomicBool>,
}

/// Receiving half of the in-memory bus.
pub struct MockReceiver {
    inbound: mpsc::UnboundedReceiver<CanFrame>,
}

impl MockBus {
    pub fn new() -> (MockBus, MockReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = MockBus {
            recorded: Arc::new(Mutex::new(Recorded::default())),
            inbound: Arc::new(Mutex::new(Some(tx))),
            closed: Arc::new(AtomicBool::new(false)),
        };
        (bus, MockReceiver { inbound: rx })
    }

    /// Queues a frame for the receiver.
    pub fn inject(&self, frame: CanFrame) {
        if let Some(tx) = self.inbound.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            let _ = tx.send(frame);
        }
    }

    /// Ends the inbound stream once the queued frames are consumed.
    pub fn finish(&self) {
        self.inbound.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Frames sent once, in order.
    pub fn sent(&self) -> Vec<CanFrame> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner()).sent.clone()
    }

    /// Frames scheduled for periodic emission, with their interval.
    pub fn periodic(&self) -> Vec<(CanFrame, Duration)> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner()).periodic.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSender for MockBus {
    async fn send(&self, frame: &CanFrame) -> Result<()> {
        if self.is_closed() {
            return Err(GatewayError::Bus("bus closed".into()));
        }
        self.recorded
            .lock()
            .map_err(|_| GatewayError::Bus("mock bus poisoned".into()))?
            .sent
            .push(frame.clone());
        Ok(())
    }

    async fn send_periodic(&self, frame: CanFrame, interval: Duration) -> Result<()> {
        if self.is_closed() {
            return Err(GatewayError::Bus("bus closed".into()));
        }
        self.recorded
            .lock()
            .map_err(|_| GatewayError::Bus("mock bus poisoned".into()))?
            .periodic
            .push((frame, interval));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl FrameReceiver for MockReceiver {
    async fn recv(&mut self) -> Result<CanFrame> {
        self.inbound.recv().await.ok_or(GatewayError::EndOfStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inject_then_finish() {
        let (bus, mut rx) = MockBus::new();
        let frame = CanFrame::new(0x1F00_0801, &[0x08, 0x42]).unwrap();
        bus.inject(frame.clone());
        bus.finish();
        assert_eq!(rx.recv().await.unwrap(), frame);
        assert!(matches!(rx.recv().await, Err(GatewayError::EndOfStream)));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (bus, _rx) = MockBus::new();
        let frame = CanFrame::new(0x1FE0_0801, &[0x01]).unwrap();
        bus.send(&frame).await.unwrap();
        bus.close().await.unwrap();
        assert!(bus.send(&frame).await.is_err());
        assert_eq!(bus.sent(), vec![frame]);
    }
}
