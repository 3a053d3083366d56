//! # Logging
//!
//! The crate logs through the `log` facade. The binary installs `env_logger`
//! as backend through [`init_logger`].

use std::time::{Duration, Instant};

use log::{debug, log_enabled, Level, LevelFilter};

use crate::protocol::CanFrame;
use crate::util::hex::format_hex_compact;

/// Initializes the logger with the `env_logger` crate.
///
/// The default level is `info`, or `debug` when `verbose` is set. A `RUST_LOG`
/// variable in the environment takes precedence over both.
pub fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init()
        .unwrap_or(());
}

/// Logs a frame with a hex dump of its payload at debug level.
pub fn log_frame_hex(prefix: &str, frame: &CanFrame) {
    if log_enabled!(Level::Debug) {
        debug!(
            "{prefix}: id=0x{:08X} [{}] {}",
            frame.id(),
            frame.data().len(),
            format_hex_compact(frame.data())
        );
    }
}

/// Rate limiter for log messages that can repeat on every frame, such as
/// publish failures while the broker is unreachable.
#[derive(Debug)]
pub struct LogThrottle {
    window: Duration,
    cap: u32,
    count: u32,
    suppressed: u32,
    t0: Instant,
}

impl LogThrottle {
    /// Allows at most `cap` messages per `window`.
    pub fn new(window: Duration, cap: u32) -> Self {
        LogThrottle {
            window,
            cap,
            count: 0,
            suppressed: 0,
            t0: Instant::now(),
        }
    }

    /// Returns `true` if the message should be logged.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.t0) > self.window {
            if self.suppressed > 0 {
                debug!("{} similar messages suppressed", self.suppressed);
            }
            self.t0 = now;
            self.count = 0;
            self.suppressed = 0;
        }

        self.count += 1;
        let allowed = self.count <= self.cap;
        if !allowed {
            self.suppressed += 1;
        }
        allowed
    }

    /// Messages dropped in the current window.
    pub fn suppressed(&self) -> u32 {
        self.suppressed
    }
}
