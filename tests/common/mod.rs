#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use crc::Crc;
use idpu::bytes::{parse_binary_string, write_i24_be};
use idpu::decompress::HEADER_MARKER;
use idpu::huffman::HuffmanTable;
use idpu::packets::{Frame, CRC_8_IDPU};
use idpu::timecode::IdpuClock;
use idpu::InstrumentType;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 3, 1, 12, 0, 0).unwrap()
}

pub fn onboard_time(time: DateTime<Utc>) -> [u8; 8] {
    IdpuClock::default().encode(time).unwrap()
}

/// Raw frame header declaring a packet of `packet_len` bytes.
pub fn raw_header(packet_len: usize) -> Vec<u8> {
    let declared = ((packet_len + 12) * 2) as u16;
    let mut raw = vec![0x01];
    raw.extend_from_slice(&declared.to_le_bytes());
    raw.extend_from_slice(&[0x5a; 9]);
    raw.push(Crc::<u8>::new(&CRC_8_IDPU).checksum(&raw[1..]));
    raw
}

/// Split each packet into frames with at most `frame_len` payload bytes, numbered
/// consecutively from `first`.
pub fn frames_for(
    instrument: InstrumentType,
    packets: &[Vec<u8>],
    frame_len: usize,
    first: u32,
    receipt_time: DateTime<Utc>,
) -> Vec<Frame> {
    let mut frames = Vec::default();
    for packet in packets {
        for chunk in packet.chunks(frame_len) {
            frames.push(Frame {
                mission_id: 1,
                instrument,
                numerator: first + frames.len() as u32,
                denominator: 0,
                payload: Some(chunk.to_vec()),
                raw: Some(raw_header(packet.len())),
                receipt_time,
            });
        }
    }
    let denominator = frames.len().saturating_sub(1) as u32;
    for frame in &mut frames {
        frame.denominator = denominator;
    }
    frames
}

/// Builds a bitstream from binary strings and Huffman codes.
#[derive(Default)]
pub struct BitWriter {
    bits: String,
}

impl BitWriter {
    pub fn push(&mut self, bits: &str) -> &mut Self {
        self.bits.push_str(bits);
        self
    }

    pub fn push_code(&mut self, table: &HuffmanTable, code: u8) -> &mut Self {
        let codes: HashMap<u8, String> = table.entries().into_iter().map(|(p, c)| (c, p)).collect();
        self.bits.push_str(&codes[&code]);
        self
    }

    pub fn push_nibble(&mut self, x: u32) -> &mut Self {
        self.bits.push_str(&format!("{:04b}", x & 0xf));
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        parse_binary_string(&self.bits).unwrap().0
    }
}

pub fn epd_header(time: DateTime<Utc>, lossy_index: u8, indices: &[u8]) -> Vec<u8> {
    let mut dat = vec![HEADER_MARKER + lossy_index];
    dat.extend_from_slice(&onboard_time(time));
    dat.extend_from_slice(&3000u16.to_be_bytes());
    dat.extend_from_slice(indices);
    dat
}

/// Continuation with one signed delta per slot.
pub fn epd_continuation(table: &HuffmanTable, time: DateTime<Utc>, deltas: &[i32]) -> Vec<u8> {
    let mut writer = BitWriter::default();
    for delta in deltas {
        writer.push(if *delta < 0 { "01" } else { "00" });
        let m = delta.unsigned_abs();
        writer.push_code(table, (m >> 4) as u8);
        writer.push_code(table, (m & 0xf) as u8);
    }
    epd_continuation_bits(time, &writer.finish())
}

pub fn epd_continuation_bits(time: DateTime<Utc>, bits: &[u8]) -> Vec<u8> {
    let mut dat = vec![0x00];
    dat.extend_from_slice(&onboard_time(time));
    dat.extend_from_slice(&3000u16.to_be_bytes());
    dat.extend_from_slice(bits);
    dat
}

/// A group of one header of all zero indices and `continuations` packets each adding 1
/// to slot 0, spaced `spacing` apart.
pub fn epd_group(
    table: &HuffmanTable,
    start: DateTime<Utc>,
    spacing: Duration,
    continuations: usize,
) -> Vec<Vec<u8>> {
    let mut packets = vec![epd_header(start, 0, &[0u8; 256])];
    let mut deltas = vec![0; 256];
    deltas[0] = 1;
    for n in 1..=continuations {
        packets.push(epd_continuation(table, start + spacing * n as i32, &deltas));
    }
    packets
}

/// Magnetometer packet with a header triple and deltas cycling X, Y, Z. Delta
/// magnitudes must be multiples of 16 below 0x10_0000.
pub fn fgm_packet(
    table: &HuffmanTable,
    time: DateTime<Utc>,
    triple: [i32; 3],
    deltas: &[i32],
) -> Vec<u8> {
    let mut dat = onboard_time(time).to_vec();
    for v in triple {
        dat.extend_from_slice(&write_i24_be(v));
    }
    let mut writer = BitWriter::default();
    for delta in deltas {
        writer.push(if *delta < 0 { "01" } else { "00" });
        let m = delta.unsigned_abs();
        writer.push_code(table, ((m >> 16) & 0xf) as u8);
        writer.push_code(table, ((m >> 12) & 0xf) as u8);
        writer.push_nibble(m >> 8);
        writer.push_nibble(m >> 4);
    }
    writer.push("11");
    dat.extend_from_slice(&writer.finish());
    dat
}
