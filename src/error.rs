use crate::InstrumentType;

/// Fatal errors. These indicate a caller or configuration problem and abort the current
/// request. Data corruption never produces one of these, see [DecodeError] and
/// [StructuralError].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Not enough bytes")]
    NotEnoughData { actual: usize, minimum: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid sector count {0}; must be 4 or 16")]
    SectorCount(usize),
    #[error("invalid instrument type code {0}")]
    InstrumentType(u8),
    #[error("instrument type {0:?} is not supported here")]
    UnsupportedInstrument(InstrumentType),
    #[error("input mixes instrument types {0:?} and {1:?}")]
    MixedInstruments(InstrumentType, InstrumentType),

    /// Huffman or lossy table configuration is unusable.
    #[error("invalid table config: {0}")]
    TableConfig(String),

    #[error("invalid timecode: {0}")]
    Timecode(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Corruption detected while decompressing. Always recovered locally by dropping the
/// current period and resynchronizing on the next header.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("ran out of bits")]
    OutOfBits,
    #[error("no huffman code matches prefix {0}")]
    HuffmanPrefix(String),
    #[error("invalid sign bits {0:#04b}")]
    InvalidSign(u8),
    /// The `11` sign marker. Only an error for instruments that do not use it as a
    /// terminator.
    #[error("end of deltas marker")]
    EndOfDeltas,
    #[error("reconstructed value {0} out of range")]
    ValueOutOfRange(i32),
    #[error("no lossy table value for index {0}")]
    LossyIndex(u8),
    #[error("expected {expected} header values, got {actual}")]
    HeaderLength { expected: usize, actual: usize },
    #[error("packet too short; need {minimum} bytes, got {actual}")]
    ShortPacket { actual: usize, minimum: usize },
    #[error("continuation without a preceding header")]
    BrokenChain,
    #[error("wrong species tag {0:#x}")]
    Species(u8),
    #[error("packet has no onboard time")]
    MissingTime,
}

impl DecodeError {
    /// Short stable name used as a statistics key.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::OutOfBits => "out_of_bits",
            DecodeError::HuffmanPrefix(_) => "huffman_prefix",
            DecodeError::InvalidSign(_) => "invalid_sign",
            DecodeError::EndOfDeltas => "end_of_deltas",
            DecodeError::ValueOutOfRange(_) => "value_out_of_range",
            DecodeError::LossyIndex(_) => "lossy_index",
            DecodeError::HeaderLength { .. } => "header_length",
            DecodeError::ShortPacket { .. } => "short_packet",
            DecodeError::BrokenChain => "broken_chain",
            DecodeError::Species(_) => "species",
            DecodeError::MissingTime => "missing_time",
        }
    }
}

/// Reasons a frame group could not be reassembled into a packet. Each one becomes a
/// placeholder row.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralError {
    #[error("frame has no payload")]
    NullPayload,
    #[error("raw frame missing or too short for a header")]
    NoHeader,
    #[error("header crc mismatch; expected {expected:#04x} got {actual:#04x}")]
    Crc { expected: u8, actual: u8 },
    #[error("declared length too small")]
    DeclaredLength,
    #[error("ran out of frames; have {have} of {expected} bytes")]
    Truncated { have: usize, expected: usize },
    #[error("length mismatch; have {have} of {expected} bytes")]
    Length { have: usize, expected: usize },
    #[error("{missing} frames missing before numerator {numerator}; more than {bound}")]
    Gap { numerator: u32, missing: u32, bound: u32 },
}

impl StructuralError {
    /// Short stable name used as a summary key.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StructuralError::NullPayload => "null_payload",
            StructuralError::NoHeader => "no_header",
            StructuralError::Crc { .. } => "crc",
            StructuralError::DeclaredLength => "declared_length",
            StructuralError::Truncated { .. } => "truncated",
            StructuralError::Length { .. } => "length",
            StructuralError::Gap { .. } => "gap",
        }
    }
}
