//! The can module contains the bus transports the gateway reads frames from and
//! writes requests to: a live SocketCAN interface, a replayed `candump` trace and
//! an in-memory bus for tests.

pub mod mock;
#[cfg(target_os = "linux")]
pub mod socketcan;
pub mod trace;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::CanFrame;

/// Receiving half of a bus.
#[async_trait]
pub trait FrameReceiver: Send {
    /// Waits for the next data frame.
    ///
    /// Returns `GatewayError::EndOfStream` once the bus can deliver no more frames.
    async fn recv(&mut self) -> Result<CanFrame>;
}

/// Sending half of a bus, shared by all loops that emit requests.
#[async_trait]
pub trait FrameSender: Send + Sync {
    async fn send(&self, frame: &CanFrame) -> Result<()>;

    /// Emits `frame` every `interval` until the bus is closed.
    async fn send_periodic(&self, frame: CanFrame, interval: Duration) -> Result<()>;

    /// Stops periodic emission and releases the bus.
    async fn close(&self) -> Result<()>;
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusSource {
    /// A live network device such as `can0`.
    Interface(String),
    /// A recorded `candump` log.
    Trace(PathBuf),
}

impl BusSource {
    /// Only a live bus accepts requests, so periodic polling runs only there.
    pub fn is_live(&self) -> bool {
        matches!(self, BusSource::Interface(_))
    }
}

/// Opens the bus and splits it into its two halves.
pub async fn open_bus(source: &BusSource) -> Result<(Arc<dyn FrameSender>, Box<dyn FrameReceiver>)> {
    match source {
        BusSource::Interface(interface) => open_interface(interface),
        BusSource::Trace(path) => {
            let (sender, receiver) = trace::open_trace(path).await?;
            Ok((Arc::new(sender), Box::new(receiver)))
        }
    }
}

#[cfg(target_os = "linux")]
fn open_interface(interface: &str) -> Result<(Arc<dyn FrameSender>, Box<dyn FrameReceiver>)> {
    let (sender, receiver) = socketcan::open_socketcan(interface)?;
    Ok((Arc::new(sender), Box::new(receiver)))
}

#[cfg(not(target_os = "linux"))]
fn open_interface(interface: &str) -> Result<(Arc<dyn FrameSender>, Box<dyn FrameReceiver>)> {
    Err(crate::error::GatewayError::Bus(format!(
        "cannot open {interface}: SocketCAN is only available on Linux"
    )))
}
