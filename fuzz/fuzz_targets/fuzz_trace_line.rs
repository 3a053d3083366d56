#![no_main]

use hoval_gw::can::trace::parse_trace_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Ok(Some(frame)) = parse_trace_line(line) {
            assert!(frame.data().len() <= 8);
        }
    }
});
