use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Packet;
use crate::StructuralError;

/// Tracks stats on frame reassembly.
///
/// # Example
/// ```
/// use idpu::packets::{Reassembler, Summary};
///
/// let (packets, summary) = Reassembler::builder().build().reassemble(&[]);
/// assert!(packets.is_empty());
/// assert_eq!(summary.packets, 0);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Frames received.
    pub frames: usize,
    /// Packets successfully reassembled.
    pub packets: usize,
    /// Placeholder rows, including those for missing numerators.
    pub placeholders: usize,
    /// Numerators never received.
    pub missing: usize,
    /// Bytes of reassembled packet data.
    pub bytes: usize,
    /// Structural failures keyed by [StructuralError::kind].
    pub failures: BTreeMap<String, usize>,
}

impl Summary {
    pub fn add(&mut self, packet: &Packet) {
        match &packet.data {
            Some(data) => {
                self.packets += 1;
                self.bytes += data.len();
            }
            None => self.placeholders += 1,
        }
    }

    pub fn add_failure(&mut self, err: &StructuralError) {
        *self.failures.entry(err.kind().to_string()).or_default() += 1;
    }

    /// Number of structural failures of all kinds.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.values().sum()
    }

    /// Fold the counts from `other` into this summary.
    pub fn combine(&mut self, other: &Summary) {
        self.frames += other.frames;
        self.packets += other.packets;
        self.placeholders += other.placeholders;
        self.missing += other.missing;
        self.bytes += other.bytes;
        for (kind, count) in &other.failures {
            *self.failures.entry(kind.clone()).or_default() += count;
        }
    }
}
