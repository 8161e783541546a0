use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, span, trace, Level};

use super::{DecodeStats, DecodedRow, Reading};
use crate::bytes::{read_i24_be, Bits};
use crate::error::{DecodeError, Error, Result};
use crate::packets::Packet;
use crate::tables::Tables;

/// Bytes before the delta bitstream: onboard time then the X, Y, Z header triple.
const HEADER_LEN: usize = 17;
const TRIPLE_OFFSET: usize = 8;
/// Allowed relative deviation from the nominal header gap.
const RATE_TOLERANCE: f64 = 0.2;
/// Samples per packet at which the header gap equals the nominal sample period.
const REFERENCE_MULTIPLIER: u32 = 10;

/// Classified magnetometer sampling rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplingRate {
    TenHertz,
    EightyHertz,
    Unknown,
}

impl SamplingRate {
    /// Nominal time between samples, `None` for [SamplingRate::Unknown].
    #[must_use]
    pub fn period(self) -> Option<Duration> {
        match self {
            SamplingRate::TenHertz => Some(Duration::milliseconds(100)),
            SamplingRate::EightyHertz => Some(Duration::microseconds(12_500)),
            SamplingRate::Unknown => None,
        }
    }
}

/// Classify the sampling rate from the time between consecutive header packets.
///
/// Each band is centred on the nominal sample period scaled by
/// `multiplier / 10`, so with the pre-cutover multiplier of 10 headers arrive once per sample
/// period and with 25 they arrive 2.5 periods apart. A gap within ±20% of a band's centre
/// selects that band.
///
/// # Example
/// ```
/// use chrono::Duration;
/// use idpu::decompress::{check_sampling_rate, SamplingRate};
///
/// assert_eq!(check_sampling_rate(Duration::milliseconds(100), 10), SamplingRate::TenHertz);
/// assert_eq!(check_sampling_rate(Duration::milliseconds(250), 25), SamplingRate::TenHertz);
/// assert_eq!(check_sampling_rate(Duration::microseconds(12_500), 10), SamplingRate::EightyHertz);
/// assert_eq!(check_sampling_rate(Duration::seconds(1), 10), SamplingRate::Unknown);
/// ```
#[must_use]
pub fn check_sampling_rate(gap: Duration, multiplier: u32) -> SamplingRate {
    let Some(nanos) = gap.num_nanoseconds() else {
        return SamplingRate::Unknown;
    };
    if multiplier == 0 || nanos <= 0 {
        return SamplingRate::Unknown;
    }
    let gap = nanos as f64 / 1e9;
    let scale = f64::from(multiplier) / f64::from(REFERENCE_MULTIPLIER);
    for rate in [SamplingRate::TenHertz, SamplingRate::EightyHertz] {
        let Some(nominal) = rate.period().and_then(|p| p.num_nanoseconds()) else {
            continue;
        };
        let nominal = nominal as f64 / 1e9 * scale;
        if (gap - nominal).abs() <= nominal * RATE_TOLERANCE {
            return rate;
        }
    }
    SamplingRate::Unknown
}

/// Magnetometer data product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FgmProduct {
    /// 10 Hz samples.
    Survey,
    /// 80 Hz samples.
    Fast,
}

impl FgmProduct {
    #[must_use]
    pub fn rate(self) -> SamplingRate {
        match self {
            FgmProduct::Survey => SamplingRate::TenHertz,
            FgmProduct::Fast => SamplingRate::EightyHertz,
        }
    }
}

/// Onboard encoding changes over the mission lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FgmConfig {
    /// Packets timed at or after this have delta magnitudes shifted left one more bit.
    pub magnitude_shift_from: DateTime<Utc>,
    /// Samples per compressed packet changes from `multiplier_before` to
    /// `multiplier_after` at this time.
    pub multiplier_cutover: DateTime<Utc>,
    pub multiplier_before: u32,
    pub multiplier_after: u32,
}

impl Default for FgmConfig {
    fn default() -> Self {
        let cutover = Utc
            .with_ymd_and_hms(2019, 3, 25, 0, 0, 0)
            .single()
            .expect("built-in cutover time is not valid");
        Self {
            magnitude_shift_from: cutover,
            multiplier_cutover: cutover,
            multiplier_before: 10,
            multiplier_after: 25,
        }
    }
}

impl FgmConfig {
    /// Samples per compressed packet at `time`.
    #[must_use]
    pub fn multiplier(&self, time: DateTime<Utc>) -> u32 {
        if time < self.multiplier_cutover {
            self.multiplier_before
        } else {
            self.multiplier_after
        }
    }
}

/// One X/Y/Z magnetometer sample in raw counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSample {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub rate: SamplingRate,
}

/// Decompresses magnetometer packets.
///
/// Every packet is independent: a header triple followed by deltas cycling through the
/// axes. A `11` sign ends a packet's deltas. A decode error drops the rest of the packet
/// but keeps the samples already completed.
///
/// # Example
/// ```
/// use idpu::Tables;
/// use idpu::decompress::{FgmConfig, FgmDecompressor, FgmProduct};
///
/// let tables = Tables::default();
/// let decompressor =
///     FgmDecompressor::new(&tables, FgmConfig::default(), FgmProduct::Survey).unwrap();
/// let (rows, _) = decompressor.decompress(&[]);
/// assert!(rows.is_empty());
/// ```
pub struct FgmDecompressor<'a> {
    tables: &'a Tables,
    config: FgmConfig,
    product: FgmProduct,
}

impl<'a> FgmDecompressor<'a> {
    /// # Errors
    /// [Error::TableConfig] if the magnetometer Huffman table is empty.
    pub fn new(tables: &'a Tables, config: FgmConfig, product: FgmProduct) -> Result<Self> {
        if tables.fgm_huffman.is_empty() {
            return Err(Error::TableConfig("empty fgm huffman table".to_string()));
        }
        Ok(Self {
            tables,
            config,
            product,
        })
    }

    /// Decompress a packet sequence, keeping only rows of the configured product.
    #[must_use]
    pub fn decompress(&self, packets: &[Packet]) -> (Vec<DecodedRow>, DecodeStats) {
        let span = span!(Level::DEBUG, "fgm", product = ?self.product, packets = packets.len());
        let _guard = span.enter();

        let mut stats = DecodeStats::default();
        let mut rows = Vec::default();
        let rates = self.classify(packets);

        for (idx, packet) in packets.iter().enumerate() {
            stats.packets += 1;
            let Some(data) = packet.data.as_deref() else {
                stats.skipped += 1;
                continue;
            };
            let Some(base) = packet.idpu_time else {
                stats.record(&DecodeError::MissingTime);
                continue;
            };
            stats.headers += 1;

            let (samples, err) = self.decode_packet(data, base);
            if let Some(err) = err {
                debug!(
                    numerator = packet.numerator,
                    %err,
                    samples = samples.len(),
                    "dropping rest of packet"
                );
                stats.record(&err);
            }

            let rate = rates[idx];
            let Some(period) = rate.period() else {
                trace!(numerator = packet.numerator, "unknown sampling rate");
                stats.unknown_rate += samples.len();
                continue;
            };
            if rate != self.product.rate() {
                stats.filtered += samples.len();
                continue;
            }
            for (k, [x, y, z]) in samples.into_iter().enumerate() {
                let sample = FieldSample { x, y, z, rate };
                let time = base + period * (k as i32);
                rows.push(DecodedRow::new(packet, time, Reading::Field(sample)));
                stats.rows += 1;
            }
        }

        (rows, stats)
    }

    /// Sampling rate of each packet from the time to its neighbour, the following packet
    /// if there is one. Gaps are divided by the number of positions between the packets
    /// so placeholders do not disturb the classification.
    fn classify(&self, packets: &[Packet]) -> Vec<SamplingRate> {
        let timed: Vec<(usize, DateTime<Utc>)> = packets
            .iter()
            .enumerate()
            .filter(|(_, p)| p.data.is_some())
            .filter_map(|(idx, p)| p.idpu_time.map(|t| (idx, t)))
            .collect();

        let mut rates = vec![SamplingRate::Unknown; packets.len()];
        for (pos, (idx, time)) in timed.iter().enumerate() {
            let neighbour = timed
                .get(pos + 1)
                .or_else(|| pos.checked_sub(1).and_then(|p| timed.get(p)));
            let Some((other_idx, other_time)) = neighbour else {
                continue;
            };
            let steps = idx.abs_diff(*other_idx) as i32;
            let gap = (*other_time - *time).abs() / steps;
            rates[*idx] = check_sampling_rate(gap, self.config.multiplier(*time));
        }
        rates
    }

    /// Decode the samples in one packet, returning the completed samples and the error
    /// that ended decoding early, if any.
    fn decode_packet(
        &self,
        data: &[u8],
        time: DateTime<Utc>,
    ) -> (Vec<[i32; 3]>, Option<DecodeError>) {
        if data.len() < HEADER_LEN {
            return (
                Vec::default(),
                Some(DecodeError::ShortPacket {
                    actual: data.len(),
                    minimum: HEADER_LEN,
                }),
            );
        }
        let mut current = [0i32; 3];
        for (axis, value) in current.iter_mut().enumerate() {
            let offset = TRIPLE_OFFSET + axis * 3;
            // length checked above
            *value = read_i24_be(&data[offset..]).unwrap_or_default();
        }

        let shift = time >= self.config.magnitude_shift_from;
        let mut samples = vec![current];
        let mut bits = Bits::new(&data[HEADER_LEN..]);
        let mut axis = 0;
        while !bits.is_empty() {
            let delta = match self.read_delta(&mut bits, shift) {
                Ok(delta) => delta,
                Err(DecodeError::EndOfDeltas) => break,
                Err(err) => return (samples, Some(err)),
            };
            let value = current[axis]
                .checked_add(delta)
                .ok_or(DecodeError::ValueOutOfRange(current[axis]));
            match value {
                Ok(value) => current[axis] = value,
                Err(err) => return (samples, Some(err)),
            }
            axis += 1;
            if axis == 3 {
                samples.push(current);
                axis = 0;
            }
        }
        (samples, None)
    }

    fn read_delta(&self, bits: &mut Bits, shift: bool) -> std::result::Result<i32, DecodeError> {
        let sign = bits.read_sign()?;
        let h16 = i32::from(self.tables.fgm_huffman.read(bits)?);
        let h12 = i32::from(self.tables.fgm_huffman.read(bits)?);
        let h8 = i32::from(bits.read_nibble()?);
        let h4 = i32::from(bits.read_nibble()?);
        let mut magnitude = (h16 << 16) + (h12 << 12) + (h8 << 8) + (h4 << 4);
        if shift {
            magnitude <<= 1;
        }
        Ok(sign * magnitude)
    }
}
