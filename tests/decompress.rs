mod common;

use chrono::{DateTime, Duration, Utc};
use common::{epd_continuation, epd_continuation_bits, epd_group, epd_header, fgm_packet, t0, BitWriter};
use idpu::bytes::Bits;
use idpu::decompress::{
    check_sampling_rate, DecodedRow, EpdConfig, EpdDecompressor, FgmConfig, FgmDecompressor,
    FgmProduct, Reading, SamplingRate,
};
use idpu::packets::Packet;
use idpu::{DecodeError, InstrumentType, Tables};
use test_case::test_case;

fn packet(instrument: InstrumentType, numerator: u32, data: Vec<u8>, time: DateTime<Utc>) -> Packet {
    Packet {
        mission_id: 2,
        instrument,
        numerator,
        denominator: 0,
        data: Some(data),
        idpu_time: Some(time),
        receipt_time: Some(t0()),
    }
}

fn epd_packets(payloads: Vec<Vec<u8>>, spacing: Duration) -> Vec<Packet> {
    payloads
        .into_iter()
        .enumerate()
        .map(|(n, dat)| {
            packet(
                InstrumentType::EpdElectron,
                n as u32,
                dat,
                t0() + spacing * n as i32,
            )
        })
        .collect()
}

fn particle_indices(row: &DecodedRow) -> &[u8] {
    match &row.reading {
        Reading::Particle(period) => &period.indices,
        Reading::Field(_) => panic!("expected particle reading"),
    }
}

#[test]
fn epd_single_slot_update() {
    let tables = Tables::default();
    let mut writer = BitWriter::default();
    writer
        .push("00")
        .push_code(&tables.epd_huffman, 0)
        .push_code(&tables.epd_huffman, 1);
    for _ in 1..256 {
        writer
            .push("00")
            .push_code(&tables.epd_huffman, 0)
            .push_code(&tables.epd_huffman, 0);
    }
    let payloads = vec![
        epd_header(t0(), 0, &[0u8; 256]),
        epd_continuation_bits(t0() + Duration::seconds(3), &writer.finish()),
    ];
    let packets = epd_packets(payloads, Duration::seconds(3));

    let decompressor =
        EpdDecompressor::new(&tables, EpdConfig::for_instrument(InstrumentType::EpdElectron).unwrap())
            .unwrap();
    let (rows, stats) = decompressor.decompress(&packets);

    assert_eq!(rows.len(), 2);
    assert_eq!(stats.error_count(), 0);
    let indices = particle_indices(&rows[1]);
    assert_eq!(indices[0], 1);
    assert!(indices[1..].iter().all(|i| *i == 0));
    assert_eq!(rows[1].idpu_time, t0() + Duration::seconds(3));
}

#[test_case(1; "first continuation")]
#[test_case(4; "middle continuation")]
#[test_case(9; "last continuation")]
fn epd_resync_after_corrupt_continuation(k: usize) {
    let tables = Tables::default();
    let spacing = Duration::seconds(3);
    let mut payloads = epd_group(&tables.epd_huffman, t0(), spacing, 9);
    payloads.extend(epd_group(
        &tables.epd_huffman,
        t0() + spacing * 10,
        spacing,
        9,
    ));
    // sign bits 11 are not valid for EPD
    payloads[k] = epd_continuation_bits(t0() + spacing * k as i32, &[0xff; 200]);
    let packets = epd_packets(payloads, spacing);

    let decompressor =
        EpdDecompressor::new(&tables, EpdConfig::for_instrument(InstrumentType::EpdElectron).unwrap())
            .unwrap();
    let (rows, stats) = decompressor.decompress(&packets);

    let numerators: Vec<u32> = rows.iter().map(|r| r.numerator).collect();
    let expected: Vec<u32> = (0..k as u32).chain(10..20).collect();
    assert_eq!(numerators, expected);
    assert_eq!(stats.resyncs, 1);
    assert_eq!(stats.skipped, 9 - k);
    assert_eq!(stats.errors["end_of_deltas"], 1);

    // the second group decodes from its own header
    for (n, row) in rows.iter().filter(|r| r.numerator >= 10).enumerate() {
        assert_eq!(particle_indices(row)[0] as usize, n);
    }
}

#[test]
fn epd_survey_sectors() {
    let tables = Tables::default();
    let mut deltas = vec![0; 64];
    deltas[63] = 0x20;
    let payloads = vec![
        epd_header(t0(), 0, &[0x10; 64]),
        epd_continuation(&tables.epd_huffman, t0(), &deltas),
    ];
    let packets = epd_packets(payloads, Duration::seconds(3));

    let config = EpdConfig::for_instrument(InstrumentType::EpdIonSurvey).unwrap();
    let decompressor = EpdDecompressor::new(&tables, config).unwrap();
    let (rows, _) = decompressor.decompress(&packets);

    assert_eq!(rows.len(), 2);
    let Reading::Particle(period) = &rows[1].reading else {
        panic!("expected particle reading");
    };
    assert_eq!(period.sectors, 4);
    assert_eq!(period.indices[63], 0x30);
    assert_eq!(period.value(3, 15), tables.lossy(0).unwrap().value(0x30));
    assert_eq!(period.value(0, 0), tables.lossy(0).unwrap().value(0x10));
    assert_eq!(period.to_bytes().len(), 4 * 49);
}

#[test]
fn fgm_ten_hertz_scenario() {
    // two consecutive headers 0.1 s apart with a multiplier of 10
    assert_eq!(
        check_sampling_rate(Duration::milliseconds(100), 10),
        SamplingRate::TenHertz
    );
    assert_eq!(
        check_sampling_rate(Duration::milliseconds(100), 25),
        SamplingRate::Unknown
    );
    assert_eq!(
        check_sampling_rate(Duration::milliseconds(250), 25),
        SamplingRate::TenHertz
    );
}

#[test_case(FgmProduct::Survey, Duration::milliseconds(100), 4 * 3; "survey")]
#[test_case(FgmProduct::Fast, Duration::milliseconds(100), 0; "fast filters survey data")]
#[test_case(FgmProduct::Fast, Duration::microseconds(12_500), 4 * 3; "fast")]
#[test_case(FgmProduct::Survey, Duration::milliseconds(50), 0; "unknown rate")]
fn fgm_products(product: FgmProduct, spacing: Duration, expected_rows: usize) {
    let tables = Tables::default();
    let start = t0() - Duration::days(400);
    let packets: Vec<Packet> = (0..4)
        .map(|n| {
            let time = start + spacing * n;
            let dat = fgm_packet(&tables.fgm_huffman, time, [n, 0, -n], &[0x10, 0x20, -0x30, 0x10, 0x20, -0x30]);
            packet(InstrumentType::FgmCompressed, n as u32, dat, time)
        })
        .collect();

    let decompressor = FgmDecompressor::new(&tables, FgmConfig::default(), product).unwrap();
    let (rows, stats) = decompressor.decompress(&packets);

    assert_eq!(rows.len(), expected_rows);
    assert_eq!(stats.error_count(), 0);
    if let Some(row) = rows.get(2) {
        let Reading::Field(sample) = &row.reading else {
            panic!("expected field reading");
        };
        assert_eq!((sample.x, sample.y, sample.z), (0x20, 0x40, -0x60));
        assert_eq!(sample.rate, product.rate());
        let period = product.rate().period().unwrap();
        assert_eq!(row.idpu_time, start + period * 2);
    }
}

#[test]
fn fgm_after_cutover() {
    let tables = Tables::default();
    let start = t0();
    // 10 Hz headers with a multiplier of 25
    let spacing = Duration::milliseconds(250);
    let packets: Vec<Packet> = (0..3)
        .map(|n| {
            let time = start + spacing * n;
            let dat = fgm_packet(&tables.fgm_huffman, time, [0, 0, 0], &[0x10, 0x10, 0x10]);
            packet(InstrumentType::FgmCompressed, n as u32, dat, time)
        })
        .collect();

    let decompressor =
        FgmDecompressor::new(&tables, FgmConfig::default(), FgmProduct::Survey).unwrap();
    let (rows, _) = decompressor.decompress(&packets);

    assert_eq!(rows.len(), 6);
    let Reading::Field(sample) = &rows[1].reading else {
        panic!("expected field reading");
    };
    // onboard magnitudes are doubled after the cutover
    assert_eq!(sample.x, 0x20);
}

#[test]
fn huffman_tables_round_trip() {
    let tables = Tables::default();
    for table in [&tables.epd_huffman, &tables.fgm_huffman] {
        let longest = table.entries().into_iter().max_by_key(|(p, _)| p.len()).unwrap();
        for (prefix, code) in table.entries() {
            let bits_str = format!("{prefix}{}", longest.0);
            let (buf, len) = idpu::bytes::parse_binary_string(&bits_str).unwrap();
            let mut bits = Bits::with_len(&buf, len);
            assert_eq!(table.read(&mut bits), Ok(code));
            assert_eq!(table.read(&mut bits), Ok(longest.1));
            assert!(bits.is_empty());
        }
    }
}

#[test]
fn sign_semantics() {
    let (buf, len) = idpu::bytes::parse_binary_string("00101").unwrap();
    let mut bits = Bits::with_len(&buf, len);
    assert_eq!(bits.read_sign(), Ok(1));
    assert_eq!(bits.remainder_string(), "101");

    let (buf, len) = idpu::bytes::parse_binary_string("0110").unwrap();
    let mut bits = Bits::with_len(&buf, len);
    assert_eq!(bits.read_sign(), Ok(-1));
    assert_eq!(bits.remainder_string(), "10");

    let (buf, len) = idpu::bytes::parse_binary_string("11").unwrap();
    assert_eq!(Bits::with_len(&buf, len).read_sign(), Err(DecodeError::EndOfDeltas));

    let (buf, len) = idpu::bytes::parse_binary_string("10").unwrap();
    assert_eq!(Bits::with_len(&buf, len).read_sign(), Err(DecodeError::InvalidSign(0b10)));
}
