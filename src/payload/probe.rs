//! Width-based probing of value bytes.
//!
//! When a datapoint is investigated on a live bus its true type is often not
//! known yet. Probing keeps every plausible interpretation of the value bytes
//! for the debug log. The result never feeds the published value: that is
//! always decoded with the datapoint's declared type.

use std::fmt;

use crate::payload::datatype::{decode_signed, decode_unsigned, list_index};

/// Candidate interpretations of a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// A 1, 2 or 4 byte value read as signed, unsigned and list index.
    Sized { signed: i64, unsigned: u64, list: u32 },
    /// Any other length, only readable as a list index.
    ListOnly { list: u32 },
}

/// Probes value bytes for all candidate interpretations.
pub fn probe(input: &[u8]) -> Probe {
    let list = list_index(input);
    let bits = match input.len() {
        1 => 8,
        2 => 16,
        4 => 32,
        _ => return Probe::ListOnly { list },
    };
    match (decode_signed(input, bits), decode_unsigned(input, bits)) {
        (Ok(signed), Ok(unsigned)) => Probe::Sized { signed, unsigned, list },
        _ => Probe::ListOnly { list },
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Sized { signed, unsigned, list } => {
                write!(f, "[s={signed}, u={unsigned}, list={list}]")
            }
            Probe::ListOnly { list } => write!(f, "[list={list}]"),
        }
    }
}
