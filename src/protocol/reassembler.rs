//! # Response Parser
//!
//! Reassembles multi-frame traffic into complete logical messages and decodes
//! them against the datapoint registry.
//!
//! A first frame (message kind `0x1F`) announces in its header how many
//! continuation frames follow. Messages without continuation frames are
//! parsed at once. Otherwise a pending entry is opened under the first
//! payload byte of the first frame (the session key) and every continuation
//! frame starting with the same byte is appended to it, without its key
//! byte. The final frame of a multi-frame message carries two trailing
//! control bytes which are dropped. Nothing on the wire is checksummed.
//!
//! Every failure is local to the frame that caused it: the parser logs it,
//! returns no result and keeps serving all other sessions.
//!
//! Pending entries that see no continuation frame for the configured timeout
//! are evicted, so a stale session can never absorb frames of a later,
//! unrelated message that reuses its key.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use log::{debug, error, info};

use crate::constants::{
    MIN_FRAME_PAYLOAD, MIN_MESSAGE_LEN, OFFSET_DATAPOINT_ID, OFFSET_FUNCTION_GROUP,
    OFFSET_FUNCTION_NUMBER, OFFSET_VALUE, TRAILING_CONTROL_BYTES,
};
use crate::datapoint::{Datapoint, DatapointRegistry};
use crate::error::{GatewayError, Result};
use crate::payload::{probe, Value};
use crate::protocol::envelope::{parse_header, Device, Operation};
use crate::protocol::frame::CanFrame;

/// A fully decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub device: Device,
    pub datapoint: Arc<Datapoint>,
    pub operation: Operation,
    pub value: Value,
}

/// An in-progress reassembly.
#[derive(Debug)]
struct PendingMessage {
    operation: Operation,
    device: Device,
    remaining: usize,
    buffer: BytesMut,
    last_seen: Instant,
}

/// Keyed reassembly state machine. Owns the pending and device tables.
pub struct ResponseParser {
    registry: Arc<DatapointRegistry>,
    pending: HashMap<u8, PendingMessage>,
    devices: BTreeSet<Device>,
    discovered: Vec<Device>,
    pending_timeout: Option<Duration>,
}

impl ResponseParser {
    /// Creates a parser whose pending entries never expire.
    pub fn new(registry: Arc<DatapointRegistry>) -> Self {
        ResponseParser {
            registry,
            pending: HashMap::new(),
            devices: BTreeSet::new(),
            discovered: Vec::new(),
            pending_timeout: None,
        }
    }

    /// Evicts pending entries idle for longer than `timeout`.
    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = Some(timeout);
        self
    }

    /// Feeds one frame. Returns a result only when a RESPONSE completes.
    pub fn parse(&mut self, frame: &CanFrame) -> Option<ParsedMessage> {
        self.parse_at(frame, Instant::now())
    }

    pub fn parse_at(&mut self, frame: &CanFrame, now: Instant) -> Option<ParsedMessage> {
        match self.try_parse_at(frame, now) {
            Ok(result) => result,
            Err(e @ GatewayError::OutOfLimits { .. }) => {
                error!("{e}");
                None
            }
            Err(e) => {
                debug!("Dropping frame {frame}: {e}");
                None
            }
        }
    }

    /// Like [`parse`](Self::parse) but surfaces the reason a frame was rejected.
    ///
    /// `Ok(None)` means the frame was accepted without completing a response.
    pub fn try_parse(&mut self, frame: &CanFrame) -> Result<Option<ParsedMessage>> {
        self.try_parse_at(frame, Instant::now())
    }

    pub fn try_parse_at(&mut self, frame: &CanFrame, now: Instant) -> Result<Option<ParsedMessage>> {
        let data = frame.data();
        if data.len() < MIN_FRAME_PAYLOAD {
            return Err(GatewayError::MalformedFrame(format!(
                "{} payload bytes, need at least {MIN_FRAME_PAYLOAD}",
                data.len()
            )));
        }

        self.evict_stale(now);

        let arbitration = frame.arbitration_id();
        let (_, header) = parse_header(data)
            .map_err(|e| GatewayError::MalformedFrame(format!("{e:?}")))?;

        if arbitration.is_first_frame() {
            let operation = header.operation()?;
            let device = arbitration.device();
            self.register_device(device);

            if header.declared_length == 0 {
                return self.complete(device, operation, data);
            }

            let mut buffer = BytesMut::with_capacity(8 * (header.declared_length as usize + 1));
            buffer.extend_from_slice(data);
            let replaced = self.pending.insert(
                header.session_key,
                PendingMessage {
                    operation,
                    device,
                    remaining: header.declared_length as usize,
                    buffer,
                    last_seen: now,
                },
            );
            if replaced.is_some() {
                debug!(
                    "Session 0x{:02X} restarted before completion, discarding partial message",
                    header.session_key
                );
            }
            Ok(None)
        } else {
            let Some(pending) = self.pending.get_mut(&header.session_key) else {
                debug!(
                    "Continuation frame {frame} outside of any session, ignoring"
                );
                return Ok(None);
            };

            let mut chunk = &data[1..];
            pending.remaining -= 1;
            if pending.remaining == 0 {
                chunk = &chunk[..chunk.len().saturating_sub(TRAILING_CONTROL_BYTES)];
            }
            pending.buffer.extend_from_slice(chunk);
            pending.last_seen = now;

            if pending.remaining > 0 {
                return Ok(None);
            }

            let Some(done) = self.pending.remove(&header.session_key) else {
                return Ok(None);
            };
            self.complete(done.device, done.operation, &done.buffer)
        }
    }

    /// Parses a complete message and keeps it only if it is a RESPONSE.
    fn complete(
        &self,
        device: Device,
        operation: Operation,
        message: &[u8],
    ) -> Result<Option<ParsedMessage>> {
        let parsed = self.parse_message(device, operation, message)?;
        if parsed.operation != Operation::Response {
            debug!(
                "{} from device {}: {} = {}",
                parsed.operation, parsed.device, parsed.datapoint.name, parsed.value
            );
            return Ok(None);
        }
        Ok(Some(parsed))
    }

    fn parse_message(
        &self,
        device: Device,
        operation: Operation,
        message: &[u8],
    ) -> Result<ParsedMessage> {
        if message.len() < MIN_MESSAGE_LEN {
            return Err(GatewayError::MalformedFrame(format!(
                "message of {} bytes too short for parsing",
                message.len()
            )));
        }
        let function_group = message[OFFSET_FUNCTION_GROUP];
        let function_number = message[OFFSET_FUNCTION_NUMBER];
        let datapoint_id = u16::from_be_bytes([
            message[OFFSET_DATAPOINT_ID],
            message[OFFSET_DATAPOINT_ID + 1],
        ]);
        let raw = &message[OFFSET_VALUE..];

        debug!(
            "FG: {function_group:2} FN: {function_number:2} ID: {datapoint_id:5} V: {} ORIG: {} LEN: {}",
            probe(raw),
            hex::encode(raw),
            raw.len()
        );

        let datapoint = self
            .registry
            .lookup_by_id(function_group, function_number, datapoint_id)
            .ok_or_else(|| {
                GatewayError::UnknownDatapoint(format!(
                    "({function_group}, {function_number}, {datapoint_id})"
                ))
            })?;
        let value = datapoint.datatype.decode(raw)?;
        datapoint.check_limits(&value)?;

        Ok(ParsedMessage {
            device,
            datapoint,
            operation,
            value,
        })
    }

    fn register_device(&mut self, device: Device) {
        if self.devices.insert(device) {
            info!("New device detected - {device}");
            self.discovered.push(device);
        }
    }

    fn evict_stale(&mut self, now: Instant) {
        let Some(timeout) = self.pending_timeout else {
            return;
        };
        self.pending.retain(|key, pending| {
            let keep = now.saturating_duration_since(pending.last_seen) <= timeout;
            if !keep {
                debug!("Evicting stale session 0x{key:02X} from device {}", pending.device);
            }
            keep
        });
    }

    /// Devices seen since the last call, in discovery order.
    pub fn drain_discovered(&mut self) -> Vec<Device> {
        std::mem::take(&mut self.discovered)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    /// Number of reassemblies in progress.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
