//! Delta/Huffman decompression of reassembled instrument packets.
//!
//! Decoders never fail on corrupt data. Corruption is counted in [DecodeStats], logged,
//! and the affected period or triple is dropped.
mod epd;
mod fgm;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::packets::Packet;
use crate::{DecodeError, InstrumentType};

pub use epd::{EpdConfig, EpdDecompressor, ParticlePeriod, BINS, HEADER_MARKER, MAX_CONTINUATIONS};
pub use fgm::{
    check_sampling_rate, FgmConfig, FgmDecompressor, FgmProduct, FieldSample, SamplingRate,
};

/// One decoded reading with the provenance of the packet it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedRow {
    pub mission_id: u8,
    pub instrument: InstrumentType,
    pub numerator: u32,
    pub denominator: u32,
    pub idpu_time: DateTime<Utc>,
    pub reading: Reading,
}

impl DecodedRow {
    fn new(packet: &Packet, idpu_time: DateTime<Utc>, reading: Reading) -> Self {
        Self {
            mission_id: packet.mission_id,
            instrument: packet.instrument,
            numerator: packet.numerator,
            denominator: packet.denominator,
            idpu_time,
            reading,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    Particle(ParticlePeriod),
    Field(FieldSample),
}

/// Counts of what a decompressor did with its input.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeStats {
    /// Packets examined, including placeholders.
    pub packets: usize,
    pub headers: usize,
    pub continuations: usize,
    /// Rows emitted.
    pub rows: usize,
    /// Chains abandoned because of a decode error.
    pub resyncs: usize,
    /// Packets ignored while searching for a header.
    pub skipped: usize,
    /// Rows dropped because their sampling rate could not be classified.
    pub unknown_rate: usize,
    /// Rows dropped because they belong to a different product.
    pub filtered: usize,
    /// Decode errors keyed by [DecodeError::kind].
    pub errors: BTreeMap<String, usize>,
}

impl DecodeStats {
    pub fn record(&mut self, err: &DecodeError) {
        *self.errors.entry(err.kind().to_string()).or_default() += 1;
    }

    /// Number of decode errors of all kinds.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.values().sum()
    }

    /// Fold the counts from `other` into these stats.
    pub fn combine(&mut self, other: &DecodeStats) {
        self.packets += other.packets;
        self.headers += other.headers;
        self.continuations += other.continuations;
        self.rows += other.rows;
        self.resyncs += other.resyncs;
        self.skipped += other.skipped;
        self.unknown_rate += other.unknown_rate;
        self.filtered += other.filtered;
        for (kind, count) in &other.errors {
            *self.errors.entry(kind.clone()).or_default() += count;
        }
    }
}
