//! # Trace Replay
//!
//! Replays a recorded `candump` trace as if it came from a live bus. Both
//! the log format written by `candump -l`
//!
//! ```text
//! (1436509052.249713) can0 1FE0080A#0140030400050A
//! ```
//!
//! and the default console format
//!
//! ```text
//!   can0  1FE0080A   [7]  01 40 03 04 00 05 0A
//! ```
//!
//! are understood. Frames are delivered as fast as they are read, in file
//! order. Requests sent towards a replayed trace go nowhere and are only logged.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use nom::{
    branch::alt,
    bytes::complete::{take_till, take_till1, take_while_m_n},
    character::complete::{char, digit1, hex_digit0, hex_digit1, space0, space1},
    combinator::map_res,
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use crate::can::{FrameReceiver, FrameSender};
use crate::error::{GatewayError, Result};
use crate::protocol::CanFrame;

fn interface(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn can_id(input: &str) -> IResult<&str, u32> {
    map_res(hex_digit1, |s| u32::from_str_radix(s, 16))(input)
}

fn hex_byte(input: &str) -> IResult<&str, u8> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        |s| u8::from_str_radix(s, 16),
    )(input)
}

/// `(timestamp) iface ID#DATA`
fn log_line(input: &str) -> IResult<&str, (u32, Vec<u8>)> {
    let (input, _) = delimited(char('('), take_till(|c: char| c == ')'), char(')'))(input)?;
    let (input, _) = preceded(space1, interface)(input)?;
    let (input, id) = preceded(space1, can_id)(input)?;
    let (input, _) = char('#')(input)?;
    let (input, data) = map_res(hex_digit0, |s: &str| hex::decode(s))(input)?;
    Ok((input, (id, data)))
}

/// `iface  ID   [len]  b0 b1 ...`
fn dump_line(input: &str) -> IResult<&str, (u32, Vec<u8>)> {
    let (input, _) = preceded(space0, interface)(input)?;
    let (input, id) = preceded(space1, can_id)(input)?;
    let (input, _) = preceded(space1, delimited(char('['), digit1, char(']')))(input)?;
    let (input, data) = many0(preceded(space1, hex_byte))(input)?;
    Ok((input, (id, data)))
}

/// Parses one trace line into a frame.
///
/// Blank lines and comments yield `Ok(None)`.
pub fn parse_trace_line(line: &str) -> Result<Option<CanFrame>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let (rest, (id, data)) = alt((log_line, dump_line))(trimmed)
        .map_err(|e| GatewayError::MalformedFrame(format!("trace line {trimmed:?}: {e}")))?;
    if !rest.trim().is_empty() {
        return Err(GatewayError::MalformedFrame(format!(
            "trace line {trimmed:?}: trailing {rest:?}"
        )));
    }
    CanFrame::new(id, &data).map(Some)
}

/// Receiving half of a replayed trace.
pub struct TraceReceiver {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

#[async_trait]
impl FrameReceiver for TraceReceiver {
    async fn recv(&mut self) -> Result<CanFrame> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            match parse_trace_line(&line) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => continue,
                Err(e) => warn!("Skipping trace line {}: {e}", self.line_no),
            }
        }
        Err(GatewayError::EndOfStream)
    }
}

/// Sending half of a replayed trace. Requests are logged and dropped.
pub struct TraceSender;

#[async_trait]
impl FrameSender for TraceSender {
    async fn send(&self, frame: &CanFrame) -> Result<()> {
        debug!("Replay mode, not sending {frame}");
        Ok(())
    }

    async fn send_periodic(&self, frame: CanFrame, interval: Duration) -> Result<()> {
        debug!("Replay mode, not scheduling {frame} every {interval:?}");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens a trace file for replay.
pub async fn open_trace(path: &Path) -> Result<(TraceSender, TraceReceiver)> {
    let file = File::open(path).await?;
    let receiver = TraceReceiver {
        lines: BufReader::new(file).lines(),
        line_no: 0,
    };
    Ok((TraceSender, receiver))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_format() {
        let frame = parse_trace_line("(1436509052.249713) can0 1FE0080A#0140030400050A")
            .unwrap()
            .unwrap();
        assert_eq!(frame.id(), 0x1FE0_080A);
        assert_eq!(frame.data(), &[0x01, 0x40, 0x03, 0x04, 0x00, 0x05, 0x0A]);
    }

    #[test]
    fn test_parse_dump_format() {
        let frame = parse_trace_line("  can0  1F000801   [3]  08 42 03")
            .unwrap()
            .unwrap();
        assert_eq!(frame.id(), 0x1F00_0801);
        assert_eq!(frame.data(), &[0x08, 0x42, 0x03]);
    }

    #[test]
    fn test_parse_empty_payload() {
        let frame = parse_trace_line("(0.0) vcan0 123#").unwrap().unwrap();
        assert!(frame.data().is_empty());
    }

    #[test]
    fn test_skip_blank_and_comment() {
        assert!(parse_trace_line("").unwrap().is_none());
        assert!(parse_trace_line("# recorded on site").unwrap().is_none());
    }

    #[test]
    fn test_reject_garbage() {
        assert!(parse_trace_line("not a frame").is_err());
        assert!(parse_trace_line("(0.0) can0 123#ABC").is_err());
    }
}
