//! The payload module contains the components responsible for decoding and encoding
//! the value bytes carried by protocol messages.

pub mod datatype;
pub mod probe;

pub use datatype::*;
pub use probe::{probe, Probe};
