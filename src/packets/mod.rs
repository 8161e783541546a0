//! Frame reassembly into instrument packets and merging of redundant downlinks.
mod merge;
mod reassembly;
mod summary;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::InstrumentType;

pub use merge::{calculate_offset, merge, merge_downlinks, par_merge};
pub use reassembly::{Reassembler, CRC_8_IDPU, MAX_GAP};
pub use summary::Summary;

/// A downlinked transmission unit as stored by the ground system.
///
/// `numerator`/`denominator` give the frame's position in its transmission. `raw` is the
/// physical frame including its header and CRC byte and is only used for validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub mission_id: u8,
    pub instrument: InstrumentType,
    pub numerator: u32,
    pub denominator: u32,
    pub payload: Option<Vec<u8>>,
    pub raw: Option<Vec<u8>>,
    pub receipt_time: DateTime<Utc>,
}

/// A reassembled instrument packet, or a placeholder marking where one is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub mission_id: u8,
    pub instrument: InstrumentType,
    pub numerator: u32,
    pub denominator: u32,
    pub data: Option<Vec<u8>>,
    /// Onboard collection time decoded from `data`.
    pub idpu_time: Option<DateTime<Utc>>,
    pub receipt_time: Option<DateTime<Utc>>,
}

impl Packet {
    /// A packet with no data at the position of `frame`.
    #[must_use]
    pub fn placeholder(frame: &Frame) -> Self {
        Packet {
            mission_id: frame.mission_id,
            instrument: frame.instrument,
            numerator: frame.numerator,
            denominator: frame.denominator,
            data: None,
            idpu_time: None,
            receipt_time: Some(frame.receipt_time),
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.data.is_none()
    }
}
