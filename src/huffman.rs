//! Prefix-code (Huffman) tables used by the onboard delta encoders.
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::bytes::Bits;
use crate::error::{DecodeError, Error, Result};

/// Longest code the onboard encoders emit.
pub const MAX_PREFIX_BITS: usize = 12;

/// Maps bit-prefix strings, e.g. `"0110"`, to 4-bit codes.
///
/// No key may be a prefix of another, which is checked on construction, so decoding
/// never needs to backtrack.
///
/// # Example
/// ```
/// use idpu::bytes::Bits;
/// use idpu::huffman::HuffmanTable;
///
/// let table = HuffmanTable::new([("0", 0), ("10", 1), ("11", 2)]).unwrap();
/// let dat = [0b1011_0000];
/// let mut bits = Bits::with_len(&dat, 5);
/// assert_eq!(table.read(&mut bits), Ok(1));
/// assert_eq!(table.read(&mut bits), Ok(2));
/// assert_eq!(table.read(&mut bits), Ok(0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, u8>",
    into = "BTreeMap<String, u8>"
)]
pub struct HuffmanTable {
    // keyed by (prefix length, prefix value)
    codes: HashMap<(usize, u16), u8>,
}

impl HuffmanTable {
    /// Create a table from `(prefix, code)` pairs.
    ///
    /// # Errors
    /// [Error::TableConfig] if a prefix is empty, longer than [MAX_PREFIX_BITS], contains
    /// characters other than `0`/`1`, is duplicated, or is a prefix of another key.
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u8)>,
        S: AsRef<str>,
    {
        let mut codes = HashMap::default();
        let mut keys: Vec<String> = Vec::new();
        for (prefix, code) in entries {
            let prefix = prefix.as_ref();
            if prefix.is_empty() || prefix.len() > MAX_PREFIX_BITS {
                return Err(Error::TableConfig(format!(
                    "huffman prefix {prefix:?} must be 1 to {MAX_PREFIX_BITS} bits"
                )));
            }
            if !prefix.chars().all(|c| c == '0' || c == '1') {
                return Err(Error::TableConfig(format!("invalid huffman prefix {prefix:?}")));
            }
            let value = u16::from_str_radix(prefix, 2)
                .map_err(|_| Error::TableConfig(format!("invalid huffman prefix {prefix:?}")))?;
            if codes.insert((prefix.len(), value), code).is_some() {
                return Err(Error::TableConfig(format!(
                    "duplicate huffman prefix {prefix:?}"
                )));
            }
            keys.push(prefix.to_string());
        }

        for a in &keys {
            if let Some(b) = keys.iter().find(|b| *b != a && b.starts_with(a.as_str())) {
                return Err(Error::TableConfig(format!(
                    "huffman prefix {a:?} is a prefix of {b:?}"
                )));
            }
        }

        Ok(HuffmanTable { codes })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// All `(prefix, code)` pairs sorted by prefix length then value.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, u8)> {
        let mut entries: Vec<_> = self.codes.iter().collect();
        entries.sort_by_key(|((len, value), _)| (*len, *value));
        entries
            .into_iter()
            .map(|(&(len, value), &code)| (format!("{value:0len$b}"), code))
            .collect()
    }

    /// Decode one code from `bits`, growing the candidate prefix one bit at a time.
    /// `bits` is only advanced on success.
    ///
    /// # Errors
    /// [DecodeError::OutOfBits] if the stream ends before a match, or
    /// [DecodeError::HuffmanPrefix] if no key matches within [MAX_PREFIX_BITS] bits.
    pub fn read(&self, bits: &mut Bits) -> std::result::Result<u8, DecodeError> {
        let mut cursor = bits.clone();
        let mut value: u16 = 0;
        for len in 1..=MAX_PREFIX_BITS {
            let bit = cursor.read_bit().ok_or(DecodeError::OutOfBits)?;
            value = (value << 1) | u16::from(bit);
            if let Some(code) = self.codes.get(&(len, value)) {
                *bits = cursor;
                return Ok(*code);
            }
        }
        Err(DecodeError::HuffmanPrefix(format!(
            "{value:0width$b}",
            width = MAX_PREFIX_BITS
        )))
    }
}

impl TryFrom<BTreeMap<String, u8>> for HuffmanTable {
    type Error = Error;

    fn try_from(value: BTreeMap<String, u8>) -> Result<Self> {
        HuffmanTable::new(value)
    }
}

impl From<HuffmanTable> for BTreeMap<String, u8> {
    fn from(table: HuffmanTable) -> Self {
        table.entries().into_iter().collect()
    }
}
