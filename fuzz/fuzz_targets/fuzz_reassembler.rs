#![no_main]

use std::sync::Arc;

use hoval_gw::{CanFrame, DataType, Datapoint, DatapointRegistry, ResponseParser};
use libfuzzer_sys::fuzz_target;

fn registry() -> Arc<DatapointRegistry> {
    let datatypes = [
        DataType::Signed { bits: 16, factor: 10 },
        DataType::Unsigned { bits: 32, factor: 1 },
        DataType::List { bits: 8, states: Vec::new() },
        DataType::String,
    ];
    let definitions = datatypes
        .into_iter()
        .enumerate()
        .map(|(i, datatype)| Datapoint {
            name: format!("dp{i}"),
            function_group: 1,
            function_number: 0,
            datapoint_id: i as u16,
            datatype,
            limits: None,
            periodic: false,
            unit: None,
        })
        .collect();
    Arc::new(DatapointRegistry::from_definitions(definitions).unwrap())
}

fuzz_target!(|data: &[u8]| {
    let mut parser = ResponseParser::new(registry());

    // Each record: 1 byte message kind selector, 1 byte length, payload
    let mut rest = data;
    while rest.len() >= 2 {
        let kind = if rest[0] & 1 == 1 { 0x1F } else { rest[0] >> 1 };
        let len = (rest[1] as usize % 9).min(rest.len() - 2);
        let payload = &rest[2..2 + len];
        rest = &rest[2 + len..];

        let id = ((kind as u32) << 24) | 0x0801;
        if let Ok(frame) = CanFrame::new(id, payload) {
            let _ = parser.try_parse(&frame);
        }
    }

    assert!(parser.pending_count() <= 256);
});
