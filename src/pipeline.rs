//! One call from downlinked frames to decoded rows.
use std::sync::Arc;

use crc::Algorithm;
use serde::{Deserialize, Serialize};
use tracing::{debug, span, Level};
use typed_builder::TypedBuilder;

use crate::decompress::{
    DecodeStats, DecodedRow, EpdConfig, EpdDecompressor, FgmConfig, FgmDecompressor, FgmProduct,
};
use crate::error::{Error, Result};
use crate::instrument::InstrumentType;
use crate::packets::{merge_downlinks, Frame, Packet, Reassembler, Summary, CRC_8_IDPU, MAX_GAP};
use crate::tables::Tables;
use crate::timecode::{IdpuClock, TimeConverter};

type Decode<'a> = Box<dyn Fn(&[Packet]) -> (Vec<DecodedRow>, DecodeStats) + 'a>;

/// Result of [Pipeline::process].
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Decoded rows in packet order. Rows from separate, unaligned sequences are
    /// interleaved by onboard time.
    pub rows: Vec<DecodedRow>,
    /// Reassembly stats over all downlinks.
    pub summary: Summary,
    pub stats: DecodeStats,
    /// Number of packet sequences left after merging. More than one means some downlinks
    /// could not be aligned with the others.
    pub sequences: usize,
}

/// Reassembles, merges, and decompresses frames for a single instrument.
///
/// # Example
/// ```
/// use idpu::decompress::FgmProduct;
/// use idpu::pipeline::Pipeline;
///
/// let pipeline = Pipeline::builder().product(FgmProduct::Fast).build();
/// let output = pipeline.process(&[vec![], vec![]]).unwrap();
/// assert!(output.rows.is_empty());
/// ```
#[derive(TypedBuilder)]
pub struct Pipeline {
    #[builder(default)]
    tables: Tables,
    #[builder(default = Arc::new(IdpuClock::default()))]
    converter: Arc<dyn TimeConverter>,
    /// Frame header CRC algorithm.
    #[builder(default = &CRC_8_IDPU)]
    crc: &'static Algorithm<u8>,
    /// Largest numerator gap filled with placeholders during reassembly.
    #[builder(default = MAX_GAP)]
    max_gap: u32,
    #[builder(default)]
    fgm: FgmConfig,
    /// Magnetometer product to keep. Ignored for EPD.
    #[builder(default = FgmProduct::Survey)]
    product: FgmProduct,
    /// Resolve downlink merges on the rayon thread pool.
    #[builder(default = true)]
    parallel: bool,
}

impl Pipeline {
    /// Process redundant downlinks of the same instrument. Each element of `downlinks` is
    /// the frame sequence from one downlink.
    ///
    /// # Errors
    /// [Error::MixedInstruments] if the frames are not all for one instrument, or any
    /// configuration error from building the decompressor.
    pub fn process(&self, downlinks: &[Vec<Frame>]) -> Result<Output> {
        let mut instruments = downlinks.iter().flatten().map(|f| f.instrument);
        let Some(instrument) = instruments.next() else {
            return Ok(Output::default());
        };
        if let Some(other) = instruments.find(|t| *t != instrument) {
            return Err(Error::MixedInstruments(instrument, other));
        }

        let span = span!(Level::DEBUG, "pipeline", %instrument, downlinks = downlinks.len());
        let _guard = span.enter();

        let decode = self.decoder(instrument)?;
        let reassembler = Reassembler::builder()
            .crc(self.crc)
            .converter(self.converter.clone())
            .max_gap(self.max_gap)
            .build();

        let mut summary = Summary::default();
        let sequences: Vec<Vec<Packet>> = downlinks
            .iter()
            .map(|frames| {
                let (packets, s) = reassembler.reassemble(frames);
                summary.combine(&s);
                packets
            })
            .collect();
        let sequences = merge_downlinks(sequences, self.parallel);

        let mut rows = Vec::default();
        let mut stats = DecodeStats::default();
        for seq in &sequences {
            let (seq_rows, seq_stats) = decode(seq);
            rows.extend(seq_rows);
            stats.combine(&seq_stats);
        }
        if sequences.len() > 1 {
            rows.sort_by_key(|r| r.idpu_time);
        }

        debug!(
            rows = rows.len(),
            packets = summary.packets,
            placeholders = summary.placeholders,
            decode_errors = stats.error_count(),
            sequences = sequences.len(),
            "processed"
        );
        Ok(Output {
            rows,
            summary,
            stats,
            sequences: sequences.len(),
        })
    }

    fn decoder(&self, instrument: InstrumentType) -> Result<Decode<'_>> {
        if instrument.is_fgm() {
            let decompressor = FgmDecompressor::new(&self.tables, self.fgm.clone(), self.product)?;
            Ok(Box::new(move |packets: &[Packet]| {
                decompressor.decompress(packets)
            }))
        } else {
            let config = EpdConfig::for_instrument(instrument)?;
            let decompressor = EpdDecompressor::new(&self.tables, config)?;
            Ok(Box::new(move |packets: &[Packet]| {
                decompressor.decompress(packets)
            }))
        }
    }
}
