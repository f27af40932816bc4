// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! End-to-end scenarios mirroring spec.md §8.

use jls::datatype::DataType;
use jls::registry::{SignalDef, SignalKind, SourceDef};
use jls::{Reader, Writer};

fn tmp_path(name: &str) -> std::path::PathBuf {
    let mut p = tempfile::tempdir().unwrap().keep();
    p.push(name);
    p
}

fn define_source(w: &mut Writer, id: u16, name: &str) {
    w.source_define(SourceDef {
        source_id: id,
        name: name.into(),
        vendor: "Acme".into(),
        model: "M1".into(),
        version: "1.0".into(),
        serial_number: "SN1".into(),
    })
    .unwrap();
}

fn fsr_signal(signal_id: u16, source_id: u16, data_type: DataType) -> SignalDef {
    SignalDef {
        signal_id,
        source_id,
        kind: SignalKind::Fsr,
        data_type,
        sample_rate: 1000,
        samples_per_data: 1000,
        sample_decimate_factor: 100,
        entries_per_summary: 200,
        summary_decimate_factor: 100,
        annotation_decimate_factor: 0,
        utc_decimate_factor: 0,
        sample_id_offset: 0,
        name: "sig".into(),
        units: "V".into(),
    }
}

#[test]
fn sources_round_trip_sorted_by_id() {
    let path = tmp_path("sources.jls");
    let mut w = Writer::create(&path).unwrap();
    define_source(&mut w, 3, "source-3");
    define_source(&mut w, 1, "source-1");
    w.close().unwrap();

    let r = Reader::open(&path).unwrap();
    let ids: Vec<u16> = r.sources().map(|s| s.source_id).collect();
    assert_eq!(ids, vec![0, 1, 3]);
}

#[test]
fn fsr_triangle_round_trip() {
    let path = tmp_path("triangle.jls");
    let mut w = Writer::create(&path).unwrap();
    define_source(&mut w, 3, "scope");
    w.signal_define(fsr_signal(5, 3, DataType::F32)).unwrap();

    let period = 1000usize;
    let total = 937 * period;
    let triangle: Vec<f32> = (0..total)
        .map(|i| {
            let phase = (i % period) as f32 / period as f32;
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                3.0 - 4.0 * phase
            }
        })
        .collect();

    let mut written = 0usize;
    for batch in triangle.chunks(937) {
        let carriers: Vec<u64> = batch.iter().map(|&v| v.to_bits() as u64).collect();
        w.write_samples(5, written as i64, &carriers).unwrap();
        written += batch.len();
    }
    w.close().unwrap();

    let mut r = Reader::open(&path).unwrap();
    assert_eq!(r.length(5).unwrap(), total as u64);

    let mut first1000 = vec![0u64; 1000];
    r.read(5, 0, 1000, &mut first1000).unwrap();
    for (i, &c) in first1000.iter().enumerate() {
        assert_eq!(f32::from_bits(c as u32), triangle[i]);
    }

    let mut mid = vec![0u64; 1002];
    r.read(5, 1999, 1002, &mut mid).unwrap();
    for (i, &c) in mid.iter().enumerate() {
        assert_eq!(f32::from_bits(c as u32), triangle[1999 + i]);
    }

    let mut bad = vec![0u64; 10];
    assert!(r.read(5, -25, 10, &mut bad).is_err());
}

#[test]
fn fsr_single_sample_and_non_chunk_aligned_length_round_trip() {
    let path = tmp_path("len_n.jls");
    let mut w = Writer::create(&path).unwrap();
    define_source(&mut w, 3, "scope");
    let mut one_sample = fsr_signal(5, 3, DataType::F32);
    one_sample.samples_per_data = 1000;
    w.signal_define(one_sample).unwrap();
    w.write_samples(5, 0, &[1.75f32.to_bits() as u64]).unwrap();

    let mut unaligned = fsr_signal(6, 3, DataType::F32);
    unaligned.samples_per_data = 1000;
    w.signal_define(unaligned).unwrap();
    let samples: Vec<u64> = (0..1041u32).map(|i| (i as f32).to_bits() as u64).collect();
    w.write_samples(6, 0, &samples).unwrap();
    w.close().unwrap();

    let mut r = Reader::open(&path).unwrap();
    assert_eq!(r.length(5).unwrap(), 1);
    let mut one = [0u64; 1];
    r.read(5, 0, 1, &mut one).unwrap();
    assert_eq!(f32::from_bits(one[0] as u32), 1.75f32);
    assert!(r.read(5, 0, 2, &mut [0u64; 2]).is_err());

    assert_eq!(r.length(6).unwrap(), 1041);
    let mut tail = [0u64; 41];
    r.read(6, 1000, 41, &mut tail).unwrap();
    for (i, &c) in tail.iter().enumerate() {
        assert_eq!(f32::from_bits(c as u32), (1000 + i) as f32);
    }
    assert!(r.read(6, 1000, 42, &mut [0u64; 42]).is_err());
}

#[test]
fn annotation_and_user_data_round_trip() {
    let path = tmp_path("annotations.jls");
    let mut w = Writer::create(&path).unwrap();
    define_source(&mut w, 3, "scope");
    w.signal_define(fsr_signal(5, 3, DataType::F32)).unwrap();

    let json = br#"{"a":1}"#.to_vec();
    w.write_annotation(
        5,
        42,
        0.5,
        jls::AnnotationType::Text,
        0,
        jls::StorageType::Json,
        json.clone(),
        false,
    )
    .unwrap();
    let text = b"hello".to_vec();
    w.write_annotation(
        5,
        43,
        0.0,
        jls::AnnotationType::Text,
        0,
        jls::StorageType::String,
        text.clone(),
        true,
    )
    .unwrap();
    w.write_user_data(5, 7, jls::StorageType::Binary, &[0xde, 0xad, 0xbe, 0xef])
        .unwrap();
    w.close().unwrap();

    let mut r = Reader::open(&path).unwrap();
    let mut annotations = Vec::new();
    r.read_annotations(5, 0, |a| {
        annotations.push(a.data.clone());
        0
    })
    .unwrap();
    assert_eq!(annotations[0], json);
    let mut expected_text = text.clone();
    expected_text.push(0);
    assert_eq!(annotations[1], expected_text);

    let mut user_data = Vec::new();
    r.read_user_data(5, |d| {
        user_data.push(d.data.clone());
        0
    })
    .unwrap();
    assert_eq!(user_data, vec![vec![0xde, 0xad, 0xbe, 0xef]]);
}

#[test]
fn summary_precision_matches_direct_computation() {
    let path = tmp_path("summary.jls");
    let mut w = Writer::create(&path).unwrap();
    define_source(&mut w, 3, "scope");
    w.signal_define(fsr_signal(5, 3, DataType::F32)).unwrap();

    let period = 1000usize;
    let total = 937 * period;
    let triangle: Vec<f32> = (0..total)
        .map(|i| {
            let phase = (i % period) as f32 / period as f32;
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                3.0 - 4.0 * phase
            }
        })
        .collect();
    let carriers: Vec<u64> = triangle.iter().map(|&v| v.to_bits() as u64).collect();
    w.write_samples(5, 0, &carriers).unwrap();
    w.close().unwrap();

    let mut r = Reader::open(&path).unwrap();
    let mut dst = [jls::StatsEntry {
        mean: 0.0,
        min: 0.0,
        max: 0.0,
        std: 0.0,
    }];
    r.statistics(5, 0, total as u64, 1, &mut dst).unwrap();

    let direct_mean: f64 = triangle.iter().map(|&v| v as f64).sum::<f64>() / total as f64;
    assert!((dst[0].mean - direct_mean).abs() < 1e-7 + 5e-4 * direct_mean.abs());
    assert!((dst[0].min - (-1.0)).abs() < 1e-6);
    assert!((dst[0].max - 1.0).abs() < 1e-2);
}

#[test]
fn sample_skip_fills_with_nan() {
    let path = tmp_path("skip.jls");
    let mut w = Writer::create(&path).unwrap();
    define_source(&mut w, 3, "scope");
    w.signal_define(fsr_signal(5, 3, DataType::F32)).unwrap();

    let first: Vec<u64> = (0..1000u32).map(|i| (i as f32).to_bits() as u64).collect();
    let second: Vec<u64> = (2000..3000u32).map(|i| (i as f32).to_bits() as u64).collect();
    w.write_samples(5, 0, &first).unwrap();
    w.write_samples(5, 2000, &second).unwrap();
    w.close().unwrap();

    let mut r = Reader::open(&path).unwrap();
    assert_eq!(r.length(5).unwrap(), 3000);

    let mut dst = vec![0u64; 3000];
    r.read(5, 0, 3000, &mut dst).unwrap();
    for (i, &c) in dst.iter().enumerate().take(1000) {
        assert_eq!(f32::from_bits(c as u32), i as f32);
    }
    for &c in dst.iter().skip(1000).take(1000) {
        assert!(f32::from_bits(c as u32).is_nan());
    }
    for (i, &c) in dst.iter().enumerate().skip(2000) {
        assert_eq!(f32::from_bits(c as u32), (2000 + (i - 2000)) as f32);
    }
}

#[test]
fn duplicate_and_not_found_errors() {
    let path = tmp_path("errors.jls");
    let mut w = Writer::create(&path).unwrap();
    define_source(&mut w, 3, "scope");
    let dup = w.source_define(SourceDef {
        source_id: 3,
        name: "dup".into(),
        vendor: String::new(),
        model: String::new(),
        version: String::new(),
        serial_number: String::new(),
    });
    assert!(dup.is_err());

    let mut orphan = fsr_signal(5, 99, DataType::F32);
    orphan.signal_id = 5;
    let err = w.signal_define(orphan);
    assert!(err.is_err());
    w.close().unwrap();
}

#[test]
fn signal_zero_is_reserved_and_vsr_is_unsupported_for_samples() {
    let path = tmp_path("reserved.jls");
    let mut w = Writer::create(&path).unwrap();
    define_source(&mut w, 3, "scope");

    let zero_write = w.write_samples(0, 0, &[1, 2, 3]);
    assert_eq!(
        zero_write.unwrap_err().code(),
        jls::JlsError::invalid("x").code()
    );

    let mut vsr = fsr_signal(9, 3, DataType::F32);
    vsr.kind = jls::SignalKind::Vsr;
    w.signal_define(vsr).unwrap();
    let vsr_write = w.write_samples(9, 0, &[1]);
    assert_eq!(
        vsr_write.unwrap_err().code(),
        jls::JlsError::unsupported("x").code()
    );
    w.close().unwrap();

    let mut r = Reader::open(&path).unwrap();
    assert_eq!(
        r.length(9).unwrap_err().code(),
        jls::JlsError::unsupported("x").code()
    );
}
