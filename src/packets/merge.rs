use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, span, trace, warn, Level};

use super::Packet;

/// Alignments supported by fewer than this fraction of the valid packets are logged as
/// low confidence.
const LOW_CONFIDENCE: f64 = 0.05;

fn valid_count(seq: &[Packet]) -> usize {
    seq.iter().filter(|p| p.data.is_some()).count()
}

/// Find the offset that aligns `seq2` with `seq1`, i.e., `seq2[i]` is the same packet as
/// `seq1[i + offset]`.
///
/// Offset 0 is accepted outright if more than half of the packets match in place.
/// Otherwise every payload match between the sequences votes for an offset and the most
/// voted offset wins. Returns `None` if nothing matches or the best offsets are tied.
///
/// # Example
/// ```
/// use chrono::Utc;
/// use idpu::InstrumentType;
/// use idpu::packets::{calculate_offset, Packet};
///
/// let packet = |x: u8| Packet {
///     mission_id: 1,
///     instrument: InstrumentType::EpdIon,
///     numerator: 0,
///     denominator: 0,
///     data: Some(vec![x]),
///     idpu_time: None,
///     receipt_time: Some(Utc::now()),
/// };
/// let seq1: Vec<Packet> = (0..10).map(packet).collect();
/// let seq2: Vec<Packet> = (3..13).map(packet).collect();
/// assert_eq!(calculate_offset(&seq1, &seq2), Some(3));
/// assert_eq!(calculate_offset(&seq2, &seq1), Some(-3));
/// ```
#[must_use]
pub fn calculate_offset(seq1: &[Packet], seq2: &[Packet]) -> Option<isize> {
    let valid = valid_count(seq1).min(valid_count(seq2));
    if valid == 0 {
        debug!("no packets with data, cannot align");
        return None;
    }

    let in_place = seq1
        .iter()
        .zip(seq2)
        .filter(|(a, b)| a.data.is_some() && a.data == b.data)
        .count();
    if in_place * 2 > valid {
        trace!(count = in_place, "aligned in place");
        return Some(0);
    }

    let mut index: HashMap<&[u8], Vec<usize>> = HashMap::default();
    for (i2, packet) in seq2.iter().enumerate() {
        if let Some(dat) = &packet.data {
            index.entry(dat.as_slice()).or_default().push(i2);
        }
    }

    let mut votes: HashMap<isize, usize> = HashMap::default();
    for (i1, packet) in seq1.iter().enumerate() {
        let Some(matches) = packet.data.as_ref().and_then(|d| index.get(d.as_slice())) else {
            continue;
        };
        for i2 in matches {
            let offset = i1 as isize - *i2 as isize;
            let count = votes.entry(offset).or_default();
            *count += 1;
            if *count * 2 > valid {
                trace!(offset, count = *count, "aligned");
                return Some(offset);
            }
        }
    }

    let Some(max) = votes.values().max().copied() else {
        warn!("no matching packets, cannot align");
        return None;
    };
    let mut best: Vec<isize> = votes
        .iter()
        .filter(|(_, count)| **count == max)
        .map(|(offset, _)| *offset)
        .collect();
    if best.len() > 1 {
        best.sort_unstable();
        warn!(count = max, candidates = ?best, "ambiguous alignment, cannot align");
        return None;
    }
    let offset = best[0];
    if (max as f64) < valid as f64 * LOW_CONFIDENCE {
        warn!(offset, count = max, valid, "low confidence alignment");
    }
    Some(offset)
}

/// Pick one of two packets occupying the same position.
fn resolve(first: &Packet, second: &Packet) -> Packet {
    match (&first.data, &second.data) {
        (None, Some(_)) => second.clone(),
        (Some(a), Some(b)) if a != b => {
            let keep_second = match (first.idpu_time, second.idpu_time) {
                (None, Some(_)) => true,
                (Some(_), Some(_)) => match (first.receipt_time, second.receipt_time) {
                    (Some(t1), Some(t2)) => t2 < t1,
                    (None, Some(_)) => true,
                    _ => false,
                },
                _ => false,
            };
            warn!(
                numerator = first.numerator,
                other = second.numerator,
                kept = if keep_second { "second" } else { "first" },
                "conflicting packet data"
            );
            if keep_second {
                second.clone()
            } else {
                first.clone()
            }
        }
        _ => first.clone(),
    }
}

fn merge_impl(seq1: &[Packet], seq2: &[Packet], offset: isize, parallel: bool) -> Vec<Packet> {
    let (seq1, seq2, offset) = if offset < 0 {
        (seq2, seq1, offset.unsigned_abs())
    } else {
        (seq1, seq2, offset.unsigned_abs())
    };
    let span = span!(Level::DEBUG, "merge", offset, len1 = seq1.len(), len2 = seq2.len());
    let _guard = span.enter();

    let offset = offset.min(seq1.len());
    let overlap = (seq1.len() - offset).min(seq2.len());

    let mut merged = Vec::with_capacity(offset + seq2.len().max(seq1.len() - offset));
    merged.extend_from_slice(&seq1[..offset]);
    let first = &seq1[offset..offset + overlap];
    let second = &seq2[..overlap];
    if parallel {
        merged.par_extend(
            first
                .par_iter()
                .zip(second.par_iter())
                .map(|(a, b)| resolve(a, b)),
        );
    } else {
        merged.extend(first.iter().zip(second).map(|(a, b)| resolve(a, b)));
    }
    merged.extend_from_slice(&seq2[overlap..]);
    merged.extend_from_slice(&seq1[offset + overlap..]);

    let denominator = merged.len().saturating_sub(1) as u32;
    for (idx, packet) in merged.iter_mut().enumerate() {
        packet.numerator = idx as u32;
        packet.denominator = denominator;
    }
    debug!(merged = merged.len(), overlap, "merged sequences");
    merged
}

/// Merge two aligned sequences using an offset from [calculate_offset].
///
/// The sequence starting earlier leads. Where the sequences overlap the packet with data
/// is kept; if both have differing data the one with an onboard time is preferred, then
/// the one received first. Numerators of the result are renumbered to their index and
/// denominators set to the index of the last packet.
#[must_use]
pub fn merge(seq1: &[Packet], seq2: &[Packet], offset: isize) -> Vec<Packet> {
    merge_impl(seq1, seq2, offset, false)
}

/// Same as [merge] but resolves the overlap on the rayon thread pool. Output is
/// identical.
#[must_use]
pub fn par_merge(seq1: &[Packet], seq2: &[Packet], offset: isize) -> Vec<Packet> {
    merge_impl(seq1, seq2, offset, true)
}

/// Merge any number of redundant downlinks of the same instrument.
///
/// Each downlink is merged into the first already merged sequence it aligns with.
/// Downlinks that do not align with anything are kept as separate sequences. Empty
/// downlinks are dropped.
#[must_use]
pub fn merge_downlinks(downlinks: Vec<Vec<Packet>>, parallel: bool) -> Vec<Vec<Packet>> {
    let mut merged: Vec<Vec<Packet>> = Vec::new();
    for (idx, seq) in downlinks.into_iter().enumerate() {
        if seq.is_empty() {
            trace!(downlink = idx, "empty downlink");
            continue;
        }
        let aligned = merged
            .iter()
            .enumerate()
            .find_map(|(i, m)| calculate_offset(m, &seq).map(|offset| (i, offset)));
        match aligned {
            Some((i, offset)) => {
                merged[i] = merge_impl(&merged[i], &seq, offset, parallel);
            }
            None => {
                if !merged.is_empty() {
                    debug!(downlink = idx, "downlink not aligned, keeping separate");
                }
                merged.push(seq);
            }
        }
    }
    merged
}
