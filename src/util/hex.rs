//! # Hex Formatting Utilities
//!
//! Hex renderings of frame payloads for logs and diagnostics.
//!
//! ```rust
//! use hoval_gw::util::hex::format_hex_compact;
//!
//! assert_eq!(format_hex_compact(&[0x01, 0x40, 0x03, 0x04]), "01 40 03 04");
//! ```

/// Formats data as "01 40 03 04" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
