//! Onboard collection time decoding.
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::bytes::swap_pairs;
use crate::error::{Error, Result};

/// Length of the onboard time field.
pub const TIME_LEN: usize = 8;

/// Converts an onboard time field to UTC.
///
/// Implementations receive the field after its byte pairs have been swapped into
/// natural order, see [decode_onboard_time].
pub trait TimeConverter: Send + Sync {
    /// # Errors
    /// [Error::Timecode] if the field does not represent a valid instant.
    fn convert(&self, field: &[u8; TIME_LEN]) -> Result<DateTime<Utc>>;
}

/// Swap the byte pairs of the 8 byte time field at the start of `dat` and convert it.
///
/// # Errors
/// [Error::NotEnoughData] if `dat` is shorter than [TIME_LEN], otherwise any error from
/// `converter`.
pub fn decode_onboard_time(converter: &dyn TimeConverter, dat: &[u8]) -> Result<DateTime<Utc>> {
    if dat.len() < TIME_LEN {
        return Err(Error::NotEnoughData {
            actual: dat.len(),
            minimum: TIME_LEN,
        });
    }
    let swapped = swap_pairs(&dat[..TIME_LEN]);
    let mut field = [0u8; TIME_LEN];
    field.copy_from_slice(&swapped);
    converter.convert(&field)
}

/// Default onboard clock.
///
/// The field is a big-endian count of ticks with 16 fractional bits since `epoch`, scaled
/// by `clock_factor` to correct for oscillator drift.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use idpu::timecode::{decode_onboard_time, IdpuClock};
///
/// let clock = IdpuClock::default();
/// let instant = Utc.with_ymd_and_hms(2019, 4, 1, 0, 0, 0).unwrap();
/// let field = clock.encode(instant).unwrap();
/// assert_eq!(decode_onboard_time(&clock, &field).unwrap(), instant);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdpuClock {
    pub epoch: DateTime<Utc>,
    pub clock_factor: f64,
}

impl IdpuClock {
    const TICKS_PER_SECOND: i128 = 1 << 16;
    const NANOS_PER_SECOND: i128 = 1_000_000_000;

    fn is_unscaled(&self) -> bool {
        (self.clock_factor - 1.0).abs() < f64::EPSILON
    }

    /// Inverse of [TimeConverter::convert], returning the field in its onboard,
    /// pair-swapped, byte order.
    ///
    /// # Errors
    /// [Error::Timecode] if `instant` is before the epoch or not representable.
    pub fn encode(&self, instant: DateTime<Utc>) -> Result<[u8; TIME_LEN]> {
        let mut nanos = i128::from(
            (instant - self.epoch)
                .num_nanoseconds()
                .ok_or_else(|| Error::Timecode(format!("{instant} out of range")))?,
        );
        if !self.is_unscaled() {
            nanos = (nanos as f64 / self.clock_factor).round() as i128;
        }
        if nanos < 0 {
            return Err(Error::Timecode(format!("{instant} is before clock epoch")));
        }
        let ticks = (nanos * Self::TICKS_PER_SECOND + Self::NANOS_PER_SECOND / 2)
            / Self::NANOS_PER_SECOND;
        let ticks = u64::try_from(ticks)
            .map_err(|_| Error::Timecode(format!("{instant} out of range")))?;

        let swapped = swap_pairs(&ticks.to_be_bytes());
        let mut field = [0u8; TIME_LEN];
        field.copy_from_slice(&swapped);
        Ok(field)
    }
}

impl Default for IdpuClock {
    fn default() -> Self {
        Self {
            epoch: Utc
                .with_ymd_and_hms(2000, 1, 1, 12, 0, 0)
                .single()
                .expect("built-in clock epoch is not valid"),
            clock_factor: 1.0,
        }
    }
}

impl TimeConverter for IdpuClock {
    fn convert(&self, field: &[u8; TIME_LEN]) -> Result<DateTime<Utc>> {
        let ticks = i128::from(u64::from_be_bytes(*field));
        let mut nanos = (ticks * Self::NANOS_PER_SECOND + Self::TICKS_PER_SECOND / 2)
            / Self::TICKS_PER_SECOND;
        if !self.is_unscaled() {
            nanos = (nanos as f64 * self.clock_factor).round() as i128;
        }
        let nanos = i64::try_from(nanos)
            .map_err(|_| Error::Timecode(format!("{ticks} ticks out of range")))?;
        self.epoch
            .checked_add_signed(Duration::nanoseconds(nanos))
            .ok_or_else(|| Error::Timecode(format!("{ticks} ticks out of range")))
    }
}
