// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Source and signal registries: definitions, duplicate detection, and the
//! sorted-by-id enumeration used by both the writer and the reader.
//!
//! Mirrors spec.md §4.8's auto-definition rule: a zero-valued
//! `samples_per_data`/`sample_decimate_factor`/`utc_decimate_factor` is
//! replaced with the module default at definition time, never at read time.

use std::collections::BTreeMap;

use crate::datatype::DataType;
use crate::error::{JlsError, Result};

/// Reserved id always present in a source registry, representing "no source".
pub const SOURCE_ID_NONE: u16 = 0;

/// Reserved id always present in a signal registry, representing VSR track 0
/// / "no signal" depending on context (spec.md §3).
pub const SIGNAL_ID_NONE: u16 = 0;

/// Default number of samples per DATA chunk when the caller leaves
/// `samples_per_data` as zero (spec.md §4.8).
pub const DEFAULT_SAMPLES_PER_DATA: u32 = 100_000;

/// Default decimation factor between adjacent summary levels (level 0 -> 1).
pub const DEFAULT_SAMPLE_DECIMATE_FACTOR: u32 = 100;

/// Default number of entries held per SUMMARY chunk.
pub const DEFAULT_ENTRIES_PER_SUMMARY: u32 = 200;

/// Default decimation factor between summary levels >= 1.
pub const DEFAULT_SUMMARY_DECIMATE_FACTOR: u32 = 100;

/// Default decimation factor for the annotation index.
pub const DEFAULT_ANNOTATION_DECIMATE_FACTOR: u32 = 100;

/// Default decimation factor for the UTC index track.
pub const DEFAULT_UTC_DECIMATE_FACTOR: u32 = 100;

/// Signal kind: fixed sample rate or variable sample rate (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Fsr,
    Vsr,
}

/// A defined data source.
#[derive(Debug, Clone)]
pub struct SourceDef {
    pub source_id: u16,
    pub name: String,
    pub vendor: String,
    pub model: String,
    pub version: String,
    pub serial_number: String,
}

/// A defined signal (FSR or VSR track).
#[derive(Debug, Clone)]
pub struct SignalDef {
    pub signal_id: u16,
    pub source_id: u16,
    pub kind: SignalKind,
    pub data_type: DataType,
    pub sample_rate: u32,
    pub samples_per_data: u32,
    pub sample_decimate_factor: u32,
    pub entries_per_summary: u32,
    pub summary_decimate_factor: u32,
    pub annotation_decimate_factor: u32,
    pub utc_decimate_factor: u32,
    pub sample_id_offset: i64,
    pub name: String,
    pub units: String,
}

impl SignalDef {
    /// Apply spec.md §4.8's zero-fill auto-definition rule in place.
    fn apply_auto_defaults(&mut self) {
        if self.samples_per_data == 0 {
            self.samples_per_data = DEFAULT_SAMPLES_PER_DATA;
        }
        if self.sample_decimate_factor == 0 {
            self.sample_decimate_factor = DEFAULT_SAMPLE_DECIMATE_FACTOR;
        }
        if self.entries_per_summary == 0 {
            self.entries_per_summary = DEFAULT_ENTRIES_PER_SUMMARY;
        }
        if self.summary_decimate_factor == 0 {
            self.summary_decimate_factor = DEFAULT_SUMMARY_DECIMATE_FACTOR;
        }
        if self.annotation_decimate_factor == 0 {
            self.annotation_decimate_factor = DEFAULT_ANNOTATION_DECIMATE_FACTOR;
        }
        if self.utc_decimate_factor == 0 {
            self.utc_decimate_factor = DEFAULT_UTC_DECIMATE_FACTOR;
        }
    }
}

/// Registry of sources and signals for one open file.
///
/// Enumeration order is always ascending by id (`BTreeMap`), matching
/// spec.md §4.8's "sorted by id" iteration requirement; id 0 is inserted
/// eagerly so it is always present even before any user definition.
#[derive(Debug, Default)]
pub struct Registry {
    sources: BTreeMap<u16, SourceDef>,
    signals: BTreeMap<u16, SignalDef>,
}

impl Registry {
    pub fn new() -> Self {
        let mut reg = Registry {
            sources: BTreeMap::new(),
            signals: BTreeMap::new(),
        };
        reg.sources.insert(
            SOURCE_ID_NONE,
            SourceDef {
                source_id: SOURCE_ID_NONE,
                name: String::new(),
                vendor: String::new(),
                model: String::new(),
                version: String::new(),
                serial_number: String::new(),
            },
        );
        reg.signals.insert(
            SIGNAL_ID_NONE,
            SignalDef {
                signal_id: SIGNAL_ID_NONE,
                source_id: SOURCE_ID_NONE,
                kind: SignalKind::Vsr,
                data_type: DataType::U1,
                sample_rate: 0,
                samples_per_data: 0,
                sample_decimate_factor: 0,
                entries_per_summary: 0,
                summary_decimate_factor: 0,
                annotation_decimate_factor: 0,
                utc_decimate_factor: 0,
                sample_id_offset: 0,
                name: String::new(),
                units: String::new(),
            },
        );
        reg
    }

    pub fn source_define(&mut self, def: SourceDef) -> Result<()> {
        if self.sources.contains_key(&def.source_id) {
            return Err(JlsError::source_exists(def.source_id));
        }
        tracing::debug!(source_id = def.source_id, name = %def.name, "source defined");
        self.sources.insert(def.source_id, def);
        Ok(())
    }

    pub fn source(&self, source_id: u16) -> Result<&SourceDef> {
        self.sources
            .get(&source_id)
            .ok_or_else(|| JlsError::not_found(format!("source {source_id}")))
    }

    /// Sources in ascending id order, id 0 always first.
    pub fn sources(&self) -> impl Iterator<Item = &SourceDef> {
        self.sources.values()
    }

    pub fn signal_define(&mut self, mut def: SignalDef) -> Result<()> {
        if self.signals.contains_key(&def.signal_id) {
            return Err(JlsError::signal_exists(def.signal_id));
        }
        if !self.sources.contains_key(&def.source_id) {
            return Err(JlsError::not_found(format!("source {}", def.source_id)));
        }
        if def.signal_id > 0x0FFF {
            return Err(JlsError::invalid(format!(
                "signal_id {} exceeds the 12-bit sample-bearing id cap",
                def.signal_id
            )));
        }
        if matches!(def.kind, SignalKind::Fsr) && def.sample_rate == 0 {
            return Err(JlsError::invalid("FSR signal requires a nonzero sample_rate"));
        }
        if matches!(def.data_type, DataType::U1 | DataType::U4) {
            // 8-bit-multiple DATA-chunk alignment constraint (spec.md §4.8).
            let bits = def.data_type.bit_width();
            if (def.samples_per_data * bits) % 8 != 0 && def.samples_per_data != 0 {
                return Err(JlsError::invalid(
                    "samples_per_data must pack to a whole number of bytes for sub-byte types",
                ));
            }
        }
        def.apply_auto_defaults();
        if def.samples_per_data % def.sample_decimate_factor != 0 {
            return Err(JlsError::invalid(
                "samples_per_data must be a multiple of sample_decimate_factor",
            ));
        }
        if def.entries_per_summary % def.summary_decimate_factor != 0 {
            return Err(JlsError::invalid(
                "entries_per_summary must be a multiple of summary_decimate_factor, so cascades land on SUMMARY chunk boundaries",
            ));
        }
        tracing::debug!(
            signal_id = def.signal_id,
            source_id = def.source_id,
            data_type = ?def.data_type,
            samples_per_data = def.samples_per_data,
            "signal defined"
        );
        self.signals.insert(def.signal_id, def);
        Ok(())
    }

    pub fn signal(&self, signal_id: u16) -> Result<&SignalDef> {
        self.signals
            .get(&signal_id)
            .ok_or_else(|| JlsError::not_found(format!("signal {signal_id}")))
    }

    /// Signals in ascending id order, id 0 always first.
    pub fn signals(&self) -> impl Iterator<Item = &SignalDef> {
        self.signals.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signal(id: u16) -> SignalDef {
        SignalDef {
            signal_id: id,
            source_id: 0,
            kind: SignalKind::Fsr,
            data_type: DataType::F32,
            sample_rate: 1000,
            samples_per_data: 0,
            sample_decimate_factor: 0,
            entries_per_summary: 0,
            summary_decimate_factor: 0,
            annotation_decimate_factor: 0,
            utc_decimate_factor: 0,
            sample_id_offset: 0,
            name: "sig".into(),
            units: "V".into(),
        }
    }

    #[test]
    fn reserved_id_zero_present_by_default() {
        let reg = Registry::new();
        assert!(reg.source(0).is_ok());
        assert!(reg.signal(0).is_ok());
    }

    #[test]
    fn duplicate_signal_rejected() {
        let mut reg = Registry::new();
        reg.signal_define(sample_signal(5)).unwrap();
        let err = reg.signal_define(sample_signal(5)).unwrap_err();
        assert_eq!(err.code(), JlsError::signal_exists(5).code());
    }

    #[test]
    fn auto_default_fills_zero_fields() {
        let mut reg = Registry::new();
        reg.signal_define(sample_signal(7)).unwrap();
        let def = reg.signal(7).unwrap();
        assert_eq!(def.samples_per_data, DEFAULT_SAMPLES_PER_DATA);
        assert_eq!(def.sample_decimate_factor, DEFAULT_SAMPLE_DECIMATE_FACTOR);
        assert_eq!(def.utc_decimate_factor, DEFAULT_UTC_DECIMATE_FACTOR);
    }

    #[test]
    fn signals_enumerate_sorted_by_id() {
        let mut reg = Registry::new();
        reg.signal_define(sample_signal(9)).unwrap();
        reg.signal_define(sample_signal(2)).unwrap();
        reg.signal_define(sample_signal(5)).unwrap();
        let ids: Vec<u16> = reg.signals().map(|s| s.signal_id).collect();
        assert_eq!(ids, vec![0, 2, 5, 9]);
    }

    #[test]
    fn fsr_requires_sample_rate() {
        let mut reg = Registry::new();
        let mut def = sample_signal(3);
        def.sample_rate = 0;
        let err = reg.signal_define(def).unwrap_err();
        assert_eq!(err.code(), JlsError::invalid("x").code());
    }

    #[test]
    fn undefined_source_rejected() {
        let mut reg = Registry::new();
        let mut def = sample_signal(3);
        def.source_id = 99;
        let err = reg.signal_define(def).unwrap_err();
        assert_eq!(err.code(), JlsError::not_found("x").code());
    }
}
