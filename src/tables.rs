use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::huffman::HuffmanTable;

const TABLESDB: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/src/tables.json"));

/// Number of entries in a lossy table. Index 255 has no value.
pub const LOSSY_TABLE_LEN: usize = 255;

/// Maps an 8-bit measured index to its full precision value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct LossyTable(Vec<u32>);

impl LossyTable {
    /// Largest value that fits the 24-bit uncompressed bin layout.
    pub const MAX_VALUE: u32 = 0xff_ffff;

    /// # Errors
    /// [Error::TableConfig] if `values` does not have [LOSSY_TABLE_LEN] entries or a value
    /// exceeds [Self::MAX_VALUE].
    pub fn new(values: Vec<u32>) -> Result<Self> {
        if values.len() != LOSSY_TABLE_LEN {
            return Err(Error::TableConfig(format!(
                "lossy table must have {LOSSY_TABLE_LEN} entries, got {}",
                values.len()
            )));
        }
        if let Some(v) = values.iter().find(|v| **v > Self::MAX_VALUE) {
            return Err(Error::TableConfig(format!(
                "lossy value {v} does not fit in 24 bits"
            )));
        }
        Ok(LossyTable(values))
    }

    #[must_use]
    pub fn value(&self, index: u8) -> Option<u32> {
        self.0.get(index as usize).copied()
    }
}

impl TryFrom<Vec<u32>> for LossyTable {
    type Error = Error;

    fn try_from(values: Vec<u32>) -> Result<Self> {
        LossyTable::new(values)
    }
}

impl From<LossyTable> for Vec<u32> {
    fn from(table: LossyTable) -> Self {
        table.0
    }
}

/// Static decompression tables.
///
/// The default uses the reference revision embedded at compile-time, a self-consistent
/// set of prefix codes and quantization steps. Mission table revisions are loaded with
/// [Tables::with_file].
///
/// # Example
/// ```
/// use idpu::Tables;
///
/// let tables = Tables::default();
/// assert_eq!(tables.lossy(0).unwrap().value(16), Some(16));
/// assert!(tables.lossy(9).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tables {
    pub revision: String,
    pub epd_huffman: HuffmanTable,
    pub fgm_huffman: HuffmanTable,
    /// Lossy table variants, indexed by the lossy index encoded in EPD header markers.
    pub lossy: Vec<LossyTable>,
}

impl Default for Tables {
    fn default() -> Self {
        serde_json::from_str(TABLESDB).expect("built-in tables db is not valid")
    }
}

impl Tables {
    /// Load tables from a JSON file with the same layout as the built-in database.
    ///
    /// # Errors
    /// [Error::Io] if the file cannot be read, [Error::Json] if it cannot be parsed or
    /// any table is invalid.
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Tables> {
        let tables: Tables = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        if tables.lossy.is_empty() {
            return Err(Error::TableConfig("no lossy tables".to_string()));
        }
        Ok(tables)
    }

    #[must_use]
    pub fn lossy(&self, index: u8) -> Option<&LossyTable> {
        self.lossy.get(index as usize)
    }
}
