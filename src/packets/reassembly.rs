use std::sync::Arc;

use crc::{Algorithm, Crc};
use tracing::{debug, span, trace, Level};
use typed_builder::TypedBuilder;

use super::{Frame, Packet, Summary};
use crate::timecode::{decode_onboard_time, IdpuClock, TimeConverter};
use crate::StructuralError;

/// CRC-8 protecting the physical frame header.
pub const CRC_8_IDPU: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: 0xff,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xfb,
    residue: 0x00,
};

/// Index of the header CRC byte in a raw frame. The CRC covers the bytes before it,
/// excluding the type byte at index 0.
const CRC_IDX: usize = 12;
/// Difference between the declared length half-words and the packet length.
const LENGTH_OVERHEAD: usize = 12;

/// Default limit on the number of placeholders inserted for a single numerator gap.
pub const MAX_GAP: u32 = 4096;

/// Reassembles frames into instrument packets.
///
/// Frames are handled in numerator order. The first frame of a packet carries the
/// declared packet length in its raw header; payloads of consecutive frames are
/// concatenated until that length is reached. Every failure produces a placeholder
/// [Packet] rather than an error so the output is always positionally complete.
///
/// Gaps between received numerators are filled with placeholders as long as the gap is
/// no larger than the frame's declared denominator or `max_gap`. Larger gaps indicate a
/// corrupt numerator and are counted as a single failure instead.
///
/// # Example
/// ```
/// use idpu::packets::Reassembler;
///
/// let reassembler = Reassembler::builder().build();
/// let (packets, summary) = reassembler.reassemble(&[]);
/// assert!(packets.is_empty());
/// assert_eq!(summary.frames, 0);
/// ```
#[derive(TypedBuilder)]
pub struct Reassembler {
    /// Header CRC algorithm.
    #[builder(default = &CRC_8_IDPU)]
    crc: &'static Algorithm<u8>,
    /// Converts the onboard time field of each reassembled packet.
    #[builder(default = Arc::new(IdpuClock::default()))]
    converter: Arc<dyn TimeConverter>,
    /// Largest numerator gap filled with placeholders.
    #[builder(default = MAX_GAP)]
    max_gap: u32,
}

impl Reassembler {
    /// Reassemble `frames`, which should all be for the same mission and instrument.
    ///
    /// Duplicate numerators are dropped, keeping a frame with a payload if there is one.
    /// Numerators never received become placeholders.
    #[must_use]
    pub fn reassemble(&self, frames: &[Frame]) -> (Vec<Packet>, Summary) {
        let span = span!(Level::DEBUG, "reassemble", frames = frames.len());
        let _guard = span.enter();

        let crc = Crc::<u8>::new(self.crc);
        let mut frames: Vec<&Frame> = frames.iter().collect();
        // duplicates with a payload sort first and are the ones kept
        frames.sort_by_key(|f| (f.numerator, f.payload.is_none()));
        let received = frames.len();
        frames.dedup_by_key(|f| f.numerator);
        if frames.len() < received {
            debug!(duplicates = received - frames.len(), "dropped duplicate frames");
        }

        let mut summary = Summary {
            frames: received,
            ..Summary::default()
        };
        let mut packets: Vec<Packet> = Vec::with_capacity(frames.len());
        let mut next: Option<u32> = None;
        let mut idx = 0;
        while idx < frames.len() {
            let frame = frames[idx];
            if let Some(next) = next {
                let missing = frame.numerator.saturating_sub(next);
                let bound = frame.denominator.min(self.max_gap);
                if missing > bound {
                    let err = StructuralError::Gap {
                        numerator: frame.numerator,
                        missing,
                        bound,
                    };
                    debug!(%err, "not filling numerator gap");
                    summary.add_failure(&err);
                } else {
                    for numerator in next..frame.numerator {
                        let packet = Packet {
                            numerator,
                            receipt_time: None,
                            ..Packet::placeholder(frame)
                        };
                        summary.missing += 1;
                        summary.add(&packet);
                        packets.push(packet);
                    }
                }
            }

            match self.assemble(&crc, &frames[idx..]) {
                Ok((packet, consumed)) => {
                    trace!(
                        numerator = frame.numerator,
                        frames = consumed,
                        "reassembled packet"
                    );
                    summary.add(&packet);
                    packets.push(packet);
                    idx += consumed;
                }
                Err(err) => {
                    debug!(numerator = frame.numerator, %err, "dropping frame");
                    let packet = Packet::placeholder(frame);
                    summary.add_failure(&err);
                    summary.add(&packet);
                    packets.push(packet);
                    idx += 1;
                }
            }
            next = Some(frames[idx - 1].numerator.saturating_add(1));
        }

        (packets, summary)
    }

    /// Assemble the packet starting at `frames[0]`, returning it and the number of frames
    /// it consumed.
    fn assemble(
        &self,
        crc: &Crc<u8>,
        frames: &[&Frame],
    ) -> Result<(Packet, usize), StructuralError> {
        let first = frames[0];
        let payload = first.payload.as_ref().ok_or(StructuralError::NullPayload)?;
        let raw = first
            .raw
            .as_deref()
            .filter(|raw| raw.len() > CRC_IDX)
            .ok_or(StructuralError::NoHeader)?;

        let actual = crc.checksum(&raw[1..CRC_IDX]);
        if actual != raw[CRC_IDX] {
            return Err(StructuralError::Crc {
                expected: raw[CRC_IDX],
                actual,
            });
        }

        let declared = usize::from(u16::from_le_bytes([raw[1], raw[2]])) / 2;
        let expected = declared
            .checked_sub(LENGTH_OVERHEAD)
            .filter(|len| *len > 0)
            .ok_or(StructuralError::DeclaredLength)?;

        let mut data = payload.clone();
        let mut consumed = 1;
        while data.len() < expected {
            let truncated = StructuralError::Truncated {
                have: data.len(),
                expected,
            };
            let Some(frame) = frames.get(consumed) else {
                return Err(truncated);
            };
            if u64::from(frame.numerator) != u64::from(first.numerator) + consumed as u64 {
                return Err(truncated);
            }
            let Some(payload) = &frame.payload else {
                return Err(truncated);
            };
            data.extend_from_slice(payload);
            consumed += 1;
        }
        if data.len() != expected {
            return Err(StructuralError::Length {
                have: data.len(),
                expected,
            });
        }

        let time_field = data.get(first.instrument.time_offset()..).unwrap_or_default();
        let idpu_time = match decode_onboard_time(self.converter.as_ref(), time_field) {
            Ok(t) => Some(t),
            Err(err) => {
                trace!(numerator = first.numerator, %err, "no onboard time");
                None
            }
        };

        Ok((
            Packet {
                mission_id: first.mission_id,
                instrument: first.instrument,
                numerator: first.numerator,
                denominator: first.denominator,
                data: Some(data),
                idpu_time,
                receipt_time: Some(first.receipt_time),
            },
            consumed,
        ))
    }
}
