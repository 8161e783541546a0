//! Bit and byte level helpers shared by the reassembler and the decompressors.
use crate::error::DecodeError;

/// Render `dat` as a string of `'0'` and `'1'`, most significant bit of each byte first.
///
/// ```
/// use idpu::bytes::bytes_to_binary_string;
/// assert_eq!(bytes_to_binary_string(&[0xa5, 0x01]), "1010010100000001");
/// ```
#[must_use]
pub fn bytes_to_binary_string(dat: &[u8]) -> String {
    dat.iter().map(|b| format!("{b:08b}")).collect()
}

/// Pack a string of `'0'`/`'1'` into bytes, MSB first, zero padding the final byte.
///
/// Returns the bytes and the number of significant bits, or `None` if `s` contains any
/// other character.
#[must_use]
pub fn parse_binary_string(s: &str) -> Option<(Vec<u8>, usize)> {
    let mut buf = vec![0u8; s.len().div_ceil(8)];
    for (idx, c) in s.chars().enumerate() {
        match c {
            '0' => {}
            '1' => buf[idx / 8] |= 0x80 >> (idx % 8),
            _ => return None,
        }
    }
    Some((buf, s.len()))
}

/// Swap every adjacent pair of bytes. The onboard format stores 16-bit words byte-swapped.
/// A trailing odd byte is left where it is.
#[must_use]
pub fn swap_pairs(dat: &[u8]) -> Vec<u8> {
    let mut out = dat.to_vec();
    for pair in out.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
    out
}

#[must_use]
pub fn read_u16_be(dat: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([*dat.first()?, *dat.get(1)?]))
}

#[must_use]
pub fn read_u24_be(dat: &[u8]) -> Option<u32> {
    if dat.len() < 3 {
        return None;
    }
    Some(u32::from_be_bytes([0, dat[0], dat[1], dat[2]]))
}

/// Read a 3 byte big-endian two's complement integer.
#[must_use]
pub fn read_i24_be(dat: &[u8]) -> Option<i32> {
    let x = read_u24_be(dat)?;
    // move the sign bit to the top and shift back to sign extend
    Some(((x << 8) as i32) >> 8)
}

#[must_use]
pub fn write_u16_be(x: u16) -> [u8; 2] {
    x.to_be_bytes()
}

/// Lower 24 bits of `x` as 3 big-endian bytes.
#[must_use]
pub fn write_u24_be(x: u32) -> [u8; 3] {
    let b = x.to_be_bytes();
    [b[1], b[2], b[3]]
}

/// `x` as a 3 byte big-endian two's complement integer. Values outside the 24-bit range
/// wrap.
#[must_use]
pub fn write_i24_be(x: i32) -> [u8; 3] {
    write_u24_be(x as u32)
}

/// Cursor over a bit stream, MSB first.
///
/// Consumed bits are never revisited, so decoders built on this are explicit state
/// machines rather than slices of a shrinking string.
#[derive(Debug, Clone)]
pub struct Bits<'a> {
    data: &'a [u8],
    pos: usize,
    len: usize,
}

impl<'a> Bits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_len(data, data.len() * 8)
    }

    /// Only the first `len` bits of `data` are readable.
    pub fn with_len(data: &'a [u8], len: usize) -> Self {
        Bits {
            data,
            pos: 0,
            len: len.min(data.len() * 8),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.len - self.pos
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Number of bits consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_bit(&mut self) -> Option<u8> {
        if self.pos >= self.len {
            return None;
        }
        let bit = (self.data[self.pos / 8] >> (7 - self.pos % 8)) & 0x1;
        self.pos += 1;
        Some(bit)
    }

    /// Read `n` (at most 32) bits as an unsigned integer. Nothing is consumed on failure.
    ///
    /// # Errors
    /// [DecodeError::OutOfBits] if fewer than `n` bits remain.
    pub fn read_bits(&mut self, n: usize) -> Result<u32, DecodeError> {
        debug_assert!(n <= 32);
        if self.remaining() < n {
            return Err(DecodeError::OutOfBits);
        }
        let mut x = 0u32;
        for _ in 0..n {
            // can't fail, length checked above
            x = (x << 1) | u32::from(self.read_bit().unwrap_or_default());
        }
        Ok(x)
    }

    /// Read a raw 4-bit value.
    ///
    /// # Errors
    /// [DecodeError::OutOfBits]
    pub fn read_nibble(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bits(4)? as u8)
    }

    /// Read a 2-bit sign. `00` is positive, `01` is negative.
    ///
    /// # Errors
    /// [DecodeError::EndOfDeltas] for `11`, which some instruments use to terminate a
    /// packet's deltas, [DecodeError::InvalidSign] for `10`, or [DecodeError::OutOfBits].
    pub fn read_sign(&mut self) -> Result<i32, DecodeError> {
        match self.read_bits(2)? {
            0b00 => Ok(1),
            0b01 => Ok(-1),
            0b11 => Err(DecodeError::EndOfDeltas),
            x => Err(DecodeError::InvalidSign(x as u8)),
        }
    }

    /// The unread bits as a binary string. Mostly useful for diagnostics.
    #[must_use]
    pub fn remainder_string(&self) -> String {
        let mut rest = self.clone();
        let mut s = String::with_capacity(rest.remaining());
        while let Some(bit) = rest.read_bit() {
            s.push(if bit == 1 { '1' } else { '0' });
        }
        s
    }
}
