mod common;

use chrono::Duration;
use common::{frames_for, onboard_time, t0};
use idpu::packets::{Frame, Reassembler};
use idpu::InstrumentType;
use rand::{seq::SliceRandom, Rng};

fn random_packets(count: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|n| {
            let len = rng.gen_range(20..200);
            let mut dat = vec![0u8; len];
            rng.fill(&mut dat[..]);
            dat[..8].copy_from_slice(&onboard_time(t0() + Duration::seconds(n as i64)));
            dat
        })
        .collect()
}

fn payloads(frames: &[Frame]) -> Vec<Vec<u8>> {
    let (packets, summary) = Reassembler::builder().build().reassemble(frames);
    assert_eq!(summary.failed(), 0, "{summary:?}");
    packets.into_iter().map(|p| p.data.unwrap()).collect()
}

#[test]
fn clean_sequence_reassembles_to_packets() {
    let expected = random_packets(50);
    let frames = frames_for(InstrumentType::FgmCompressed, &expected, 64, 0, t0());

    let (packets, summary) = Reassembler::builder().build().reassemble(&frames);

    assert_eq!(summary.frames, frames.len());
    assert_eq!(summary.packets, expected.len());
    assert_eq!(summary.placeholders, 0);
    assert_eq!(summary.bytes, expected.iter().map(Vec::len).sum::<usize>());
    assert_eq!(packets.len(), expected.len());
    for (n, (packet, dat)) in packets.iter().zip(&expected).enumerate() {
        assert_eq!(packet.data.as_ref(), Some(dat));
        assert_eq!(packet.idpu_time, Some(t0() + Duration::seconds(n as i64)));
        assert_eq!(packet.receipt_time, Some(t0()));
    }
}

#[test]
fn reordered_and_duplicated_frames() {
    let expected = random_packets(20);
    let frames = frames_for(InstrumentType::FgmCompressed, &expected, 50, 0, t0());

    let mut shuffled = frames.clone();
    shuffled.extend_from_slice(&frames[3..9]);
    shuffled.shuffle(&mut rand::thread_rng());

    assert_eq!(payloads(&shuffled), expected);
}

#[test]
fn epd_time_offset() {
    let dat = common::epd_header(t0(), 0, &[7u8; 256]);
    let frames = frames_for(InstrumentType::EpdIon, &[dat], 100, 0, t0());
    let (packets, _) = Reassembler::builder().build().reassemble(&frames);

    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].idpu_time, Some(t0()));
}

#[test]
fn missing_frame_produces_placeholders() {
    let expected = random_packets(10);
    let mut frames = frames_for(InstrumentType::FgmCompressed, &expected, 1000, 0, t0());
    frames.remove(4);

    let (packets, summary) = Reassembler::builder().build().reassemble(&frames);

    assert_eq!(packets.len(), 10);
    assert!(packets[4].is_placeholder());
    assert_eq!(packets[4].numerator, 4);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.packets, 9);
    for (idx, packet) in packets.iter().enumerate() {
        if idx != 4 {
            assert_eq!(packet.data.as_ref(), Some(&expected[idx]));
        }
    }
}

#[test]
fn corrupt_header_drops_only_its_packet() {
    let expected: Vec<Vec<u8>> = random_packets(5)
        .into_iter()
        .map(|mut p| {
            p.resize(40, 0);
            p
        })
        .collect();
    let mut frames = frames_for(InstrumentType::FgmCompressed, &expected, 1000, 100, t0());
    frames[2].raw.as_mut().unwrap()[3] ^= 0x01;

    let (packets, summary) = Reassembler::builder().build().reassemble(&frames);

    assert_eq!(packets.len(), 5);
    assert_eq!(packets[2].numerator, 102);
    assert!(packets[2].is_placeholder());
    assert!(packets[2].idpu_time.is_none());
    assert_eq!(summary.failures["crc"], 1);
    assert_eq!(summary.packets, 4);
}

#[test]
fn run_past_end_of_input_is_truncated() {
    let expected: Vec<Vec<u8>> = random_packets(3)
        .into_iter()
        .map(|mut p| {
            p.resize(120, 0);
            p
        })
        .collect();
    // 3 frames per packet, the last frame of the final packet never arrived
    let mut frames = frames_for(InstrumentType::FgmCompressed, &expected, 50, 0, t0());
    assert_eq!(frames.len(), 9);
    frames.truncate(8);

    let (packets, summary) = Reassembler::builder().build().reassemble(&frames);

    assert_eq!(packets.len(), 4);
    assert_eq!(packets[0].data.as_ref(), Some(&expected[0]));
    assert_eq!(packets[1].data.as_ref(), Some(&expected[1]));
    assert_eq!(packets[2].numerator, 6);
    assert_eq!(packets[3].numerator, 7);
    assert!(packets[2].is_placeholder());
    assert!(packets[3].is_placeholder());
    assert_eq!(summary.failures["truncated"], 2);
    assert_eq!(summary.packets, 2);
    assert_eq!(summary.missing, 0);
}
