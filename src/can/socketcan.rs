//! # SocketCAN Transport
//!
//! Live bus access through a Linux SocketCAN network device. Sender and
//! receiver share one socket, so the receiver never sees the gateway's own
//! requests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use socketcan::tokio::CanSocket;
use socketcan::{CanFrame as SocketFrame, EmbeddedFrame, ExtendedId, Id};
use tokio::task::JoinHandle;

use crate::can::{FrameReceiver, FrameSender};
use crate::error::{GatewayError, Result};
use crate::protocol::CanFrame;

fn to_socket_frame(frame: &CanFrame) -> Result<SocketFrame> {
    let id = ExtendedId::new(frame.id())
        .ok_or_else(|| GatewayError::Bus(format!("invalid extended id 0x{:08X}", frame.id())))?;
    SocketFrame::new(id, frame.data())
        .ok_or_else(|| GatewayError::Bus(format!("cannot build frame {frame}")))
}

fn raw_id(id: Id) -> u32 {
    match id {
        Id::Standard(id) => id.as_raw() as u32,
        Id::Extended(id) => id.as_raw(),
    }
}

/// Receiving half of a SocketCAN interface.
pub struct SocketCanReceiver {
    socket: Arc<CanSocket>,
}

#[async_trait]
impl FrameReceiver for SocketCanReceiver {
    async fn recv(&mut self) -> Result<CanFrame> {
        loop {
            match self.socket.read_frame().await {
                Ok(SocketFrame::Data(frame)) => {
                    return CanFrame::new(raw_id(frame.id()), frame.data());
                }
                Ok(SocketFrame::Remote(_)) => continue,
                Ok(SocketFrame::Error(frame)) => {
                    warn!("CAN error frame received: {frame:?}");
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(GatewayError::Bus(e.to_string())),
            }
        }
    }
}

/// Sending half of a SocketCAN interface.
pub struct SocketCanSender {
    socket: Arc<CanSocket>,
    periodic: Mutex<Vec<JoinHandle<()>>>,
}

#[async_trait]
impl FrameSender for SocketCanSender {
    async fn send(&self, frame: &CanFrame) -> Result<()> {
        let socket_frame = to_socket_frame(frame)?;
        self.socket
            .write_frame(socket_frame)
            .await
            .map_err(|e| GatewayError::Bus(e.to_string()))
    }

    async fn send_periodic(&self, frame: CanFrame, interval: Duration) -> Result<()> {
        to_socket_frame(&frame)?;
        let socket = self.socket.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let result = match to_socket_frame(&frame) {
                    Ok(socket_frame) => socket
                        .write_frame(socket_frame)
                        .await
                        .map_err(|e| GatewayError::Bus(e.to_string())),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => debug!("Periodic request sent: {frame}"),
                    Err(e) => warn!("Periodic request {frame} failed: {e}"),
                }
            }
        });
        self.periodic
            .lock()
            .map_err(|_| GatewayError::Bus("periodic task table poisoned".into()))?
            .push(task);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let tasks = std::mem::take(
            &mut *self
                .periodic
                .lock()
                .map_err(|_| GatewayError::Bus("periodic task table poisoned".into()))?,
        );
        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

/// Opens a SocketCAN device and splits it into sender and receiver.
///
/// # Arguments
/// * `interface` - The name of the network device, e.g. "can0" or "vcan0"
pub fn open_socketcan(interface: &str) -> Result<(SocketCanSender, SocketCanReceiver)> {
    let socket = CanSocket::open(interface)
        .map_err(|e| GatewayError::Bus(format!("cannot open {interface}: {e}")))?;
    let socket = Arc::new(socket);
    let receiver = SocketCanReceiver {
        socket: socket.clone(),
    };
    let sender = SocketCanSender {
        socket,
        periodic: Mutex::new(Vec::new()),
    };
    Ok((sender, receiver))
}
