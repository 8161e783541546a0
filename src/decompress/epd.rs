use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, span, trace, Level};

use super::{DecodeStats, DecodedRow, Reading};
use crate::bytes::{read_u16_be, write_u24_be, Bits};
use crate::error::{DecodeError, Error, Result};
use crate::instrument::{InstrumentType, Species};
use crate::packets::Packet;
use crate::tables::{LossyTable, Tables};

/// Marker byte value of a header packet using lossy table 0. Headers using lossy table
/// `n` are marked `HEADER_MARKER + n`.
pub const HEADER_MARKER: u8 = 0xaa;
/// Continuations allowed after a header before a new header is required.
pub const MAX_CONTINUATIONS: usize = 9;
/// Energy bins per sector.
pub const BINS: usize = 16;

/// Offset of the spin period from the marker.
const SPIN_PERIOD_OFFSET: usize = 9;
/// Offset of header indices or continuation deltas from the marker.
const BODY_OFFSET: usize = 11;

/// Layout of an EPD packet stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpdConfig {
    /// Sectors per period, 16 or 4 for survey mode.
    pub sectors: usize,
    /// Expected species for inner packets, which carry a species/spin-integration byte
    /// before the marker. `None` for all other EPD streams.
    pub species: Option<Species>,
}

impl EpdConfig {
    /// # Errors
    /// [Error::SectorCount] if `sectors` is not 4 or 16.
    pub fn new(sectors: usize, species: Option<Species>) -> Result<Self> {
        if sectors != 4 && sectors != 16 {
            return Err(Error::SectorCount(sectors));
        }
        Ok(Self { sectors, species })
    }

    /// # Errors
    /// [Error::UnsupportedInstrument] if `instrument` is not an EPD type.
    pub fn for_instrument(instrument: InstrumentType) -> Result<Self> {
        if !instrument.is_epd() {
            return Err(Error::UnsupportedInstrument(instrument));
        }
        let sectors = if instrument.is_survey() { 4 } else { 16 };
        Self::new(sectors, instrument.species())
    }

    /// Offset of the marker byte.
    fn marker_offset(&self) -> usize {
        usize::from(self.species.is_some())
    }

    fn slots(&self) -> usize {
        BINS * self.sectors
    }
}

/// One decoded spin period of particle counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticlePeriod {
    pub idpu_time: DateTime<Utc>,
    pub spin_period: u16,
    pub sectors: usize,
    pub lossy_index: u8,
    /// Position in its chain, 0 for the header.
    pub continuation: usize,
    /// Measured lossy table indices, `BINS` per sector.
    pub indices: Vec<u8>,
    /// Values from the lossy table for `indices`.
    pub values: Vec<u32>,
    pub species: Option<Species>,
    /// Number of spins integrated into this period, inner packets only.
    pub spin_integration: Option<u32>,
}

impl ParticlePeriod {
    /// Layout matching an uncompressed onboard packet: each sector is a sector number
    /// byte followed by its bin values as 24-bit big-endian integers.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.sectors * (1 + BINS * 3));
        for (sector, bins) in self.values.chunks(BINS).enumerate() {
            buf.push(sector as u8);
            for value in bins {
                buf.extend_from_slice(&write_u24_be(*value));
            }
        }
        buf
    }

    /// Value for `bin` in `sector`.
    #[must_use]
    pub fn value(&self, sector: usize, bin: usize) -> Option<u32> {
        if bin >= BINS {
            return None;
        }
        self.values.get(sector * BINS + bin).copied()
    }
}

enum State {
    SeekingHeader,
    InChain {
        indices: Vec<u8>,
        continuations: usize,
    },
}

/// Decompresses EPD header/continuation chains.
///
/// A header carries every index of a period verbatim. Each following continuation
/// carries signed Huffman coded deltas against the previous period. Any corruption
/// abandons the chain and nothing more is emitted until the next header.
///
/// # Example
/// ```
/// use idpu::Tables;
/// use idpu::decompress::{EpdConfig, EpdDecompressor};
///
/// let tables = Tables::default();
/// let config = EpdConfig::new(16, None).unwrap();
/// let decompressor = EpdDecompressor::new(&tables, config).unwrap();
/// let (rows, stats) = decompressor.decompress(&[]);
/// assert!(rows.is_empty());
/// assert_eq!(stats.packets, 0);
/// ```
pub struct EpdDecompressor<'a> {
    tables: &'a Tables,
    config: EpdConfig,
}

impl<'a> EpdDecompressor<'a> {
    /// # Errors
    /// [Error::SectorCount] if the config has an invalid sector count or
    /// [Error::TableConfig] if there are no lossy tables.
    pub fn new(tables: &'a Tables, config: EpdConfig) -> Result<Self> {
        let config = EpdConfig::new(config.sectors, config.species)?;
        if tables.lossy.is_empty() {
            return Err(Error::TableConfig("no lossy tables".to_string()));
        }
        Ok(Self { tables, config })
    }

    /// Decompress a packet sequence in order, one row per valid period.
    #[must_use]
    pub fn decompress(&self, packets: &[Packet]) -> (Vec<DecodedRow>, DecodeStats) {
        let span = span!(
            Level::DEBUG,
            "epd",
            sectors = self.config.sectors,
            packets = packets.len()
        );
        let _guard = span.enter();

        let mut state = State::SeekingHeader;
        let mut lossy_index: Option<u8> = None;
        let mut stats = DecodeStats::default();
        let mut rows = Vec::default();

        for packet in packets {
            stats.packets += 1;
            let in_chain = matches!(state, State::InChain { .. });
            match self.step(&mut state, &mut lossy_index, &mut stats, packet) {
                Ok(Some(period)) => {
                    stats.rows += 1;
                    rows.push(DecodedRow::new(
                        packet,
                        period.idpu_time,
                        Reading::Particle(period),
                    ));
                }
                Ok(None) => stats.skipped += 1,
                Err(err) => {
                    debug!(numerator = packet.numerator, %err, "dropping period");
                    stats.record(&err);
                    if in_chain {
                        stats.resyncs += 1;
                    }
                    state = State::SeekingHeader;
                }
            }
        }

        (rows, stats)
    }

    fn step(
        &self,
        state: &mut State,
        lossy_index: &mut Option<u8>,
        stats: &mut DecodeStats,
        packet: &Packet,
    ) -> std::result::Result<Option<ParticlePeriod>, DecodeError> {
        let in_chain = matches!(state, State::InChain { .. });
        let Some(data) = packet.data.as_deref() else {
            return if in_chain {
                Err(DecodeError::BrokenChain)
            } else {
                Ok(None)
            };
        };

        let offset = self.config.marker_offset();
        let minimum = offset + BODY_OFFSET;
        if data.len() < minimum {
            return Err(DecodeError::ShortPacket {
                actual: data.len(),
                minimum,
            });
        }

        if let Some(species) = self.config.species {
            let tag = data[0] >> 4;
            if tag != species.tag() {
                trace!(numerator = packet.numerator, tag, "wrong species");
                return if in_chain {
                    Err(DecodeError::Species(tag))
                } else {
                    Ok(None)
                };
            }
        }

        let marker = data[offset];
        let header_index = match *lossy_index {
            Some(idx) => (HEADER_MARKER.checked_add(idx) == Some(marker)).then_some(idx),
            None => marker
                .checked_sub(HEADER_MARKER)
                .filter(|idx| self.tables.lossy(*idx).is_some()),
        };

        if let Some(idx) = header_index {
            let table = self.lossy_table(idx)?;
            let indices = &data[minimum..];
            if indices.len() != self.config.slots() {
                return Err(DecodeError::HeaderLength {
                    expected: self.config.slots(),
                    actual: indices.len(),
                });
            }
            stats.headers += 1;
            if lossy_index.is_none() {
                debug!(lossy_index = idx, "found first header");
                *lossy_index = Some(idx);
            }
            let period = self.period(packet, data, table, idx, indices.to_vec(), 0)?;
            *state = State::InChain {
                indices: period.indices.clone(),
                continuations: 0,
            };
            return Ok(Some(period));
        }

        let State::InChain {
            indices,
            continuations,
        } = state
        else {
            return Ok(None);
        };
        let idx = lossy_index.ok_or(DecodeError::BrokenChain)?;
        let table = self.lossy_table(idx)?;

        // updates go to a scratch copy so a failure leaves the chain untouched
        let mut scratch = indices.clone();
        let mut bits = Bits::new(&data[minimum..]);
        for slot in &mut scratch {
            let sign = bits.read_sign()?;
            let d1 = self.tables.epd_huffman.read(&mut bits)?;
            let d2 = self.tables.epd_huffman.read(&mut bits)?;
            let value = i32::from(*slot) + sign * ((i32::from(d1) << 4) + i32::from(d2));
            *slot = u8::try_from(value).map_err(|_| DecodeError::ValueOutOfRange(value))?;
        }

        let continuation = *continuations + 1;
        let period = self.period(packet, data, table, idx, scratch, continuation)?;
        stats.continuations += 1;
        if continuation >= MAX_CONTINUATIONS {
            trace!(numerator = packet.numerator, "chain complete");
            *state = State::SeekingHeader;
        } else {
            *indices = period.indices.clone();
            *continuations = continuation;
        }
        Ok(Some(period))
    }

    fn lossy_table(&self, idx: u8) -> std::result::Result<&LossyTable, DecodeError> {
        // header detection only accepts indexes with a table
        self.tables.lossy(idx).ok_or(DecodeError::BrokenChain)
    }

    fn period(
        &self,
        packet: &Packet,
        data: &[u8],
        table: &LossyTable,
        lossy_index: u8,
        indices: Vec<u8>,
        continuation: usize,
    ) -> std::result::Result<ParticlePeriod, DecodeError> {
        let offset = self.config.marker_offset();
        let idpu_time = packet.idpu_time.ok_or(DecodeError::MissingTime)?;
        let spin_period = read_u16_be(&data[offset + SPIN_PERIOD_OFFSET..]).ok_or(
            DecodeError::ShortPacket {
                actual: data.len(),
                minimum: offset + BODY_OFFSET,
            },
        )?;
        let values = indices
            .iter()
            .map(|idx| table.value(*idx).ok_or(DecodeError::LossyIndex(*idx)))
            .collect::<std::result::Result<Vec<u32>, DecodeError>>()?;

        Ok(ParticlePeriod {
            idpu_time,
            spin_period,
            sectors: self.config.sectors,
            lossy_index,
            continuation,
            indices,
            values,
            species: self.config.species,
            spin_integration: self.config.species.map(|_| 1u32 << (data[0] & 0x0f)),
        })
    }
}
