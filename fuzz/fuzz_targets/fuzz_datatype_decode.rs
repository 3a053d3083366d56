#![no_main]

use hoval_gw::{probe, DataType};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for bits in [8, 16, 32] {
        for factor in [1, 10, 100] {
            let signed = DataType::Signed { bits, factor };
            if let Ok(value) = signed.decode(data) {
                // Whatever decodes must encode back to the same leading bytes
                let encoded = signed.encode(&value).unwrap();
                assert_eq!(&encoded[..], &data[..encoded.len()]);
            }
            let _ = DataType::Unsigned { bits, factor }.decode(data);
        }
    }

    let _ = DataType::String.decode(data);
    let _ = probe(data).to_string();
});
