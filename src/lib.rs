#![doc = include_str!("../README.md")]

mod error;
mod instrument;

pub mod bytes;
pub mod decompress;
pub mod huffman;
pub mod packets;
pub mod pipeline;
pub mod tables;
pub mod timecode;

pub use error::{DecodeError, Error, Result, StructuralError};
pub use instrument::{InstrumentType, Species};
pub use tables::Tables;
