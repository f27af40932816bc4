// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Top-level Reader: opens a file, reconstructs the chunk directory by a
//! single forward scan, and dispatches queries to the per-signal readers.
//!
//! spec.md §4.1's `next_offset` is never stored on disk; this scan is both
//! the directory-build step and the `IO_TRUNCATED` recovery path (a missing
//! END chunk simply ends the scan early, per spec.md §5/§7).

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::chunk::ChunkReader;
use crate::error::{JlsError, Result};
use crate::format::{signal_level_from_meta, Tag, FILE_MAGIC, PROLOGUE_LENGTH};
use crate::registry::{Registry, SignalDef, SignalKind, SourceDef};
use crate::statistics::StatsEntry;
use crate::track::{AnnotationReader, AnnotationRecord, TrackReader, UserDataRecord, UtcReader};

fn read_len_prefixed_string(cursor: &mut &[u8]) -> Result<String> {
    let len = cursor.read_u16::<LittleEndian>()? as usize;
    let bytes = &cursor[..len];
    *cursor = &cursor[len..];
    // Strip the trailing NUL the writer always includes.
    let trimmed = bytes.strip_suffix(&[0]).unwrap_or(bytes);
    Ok(String::from_utf8_lossy(trimmed).into_owned())
}

#[derive(Default)]
struct Directory {
    data: HashMap<u16, Vec<u64>>,
    summary: HashMap<u16, Vec<Vec<u64>>>,
    utc: HashMap<u16, Vec<u64>>,
    annotation: HashMap<u16, Vec<u64>>,
    user_data: HashMap<u16, Vec<u64>>,
}

/// Opens a JLS file for random-access reading.
pub struct Reader {
    chunk_reader: ChunkReader,
    registry: Registry,
    tracks: HashMap<u16, TrackReader>,
    utc: HashMap<u16, UtcReader>,
    directory: Directory,
    truncated: bool,
}

impl Reader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut chunk_reader = ChunkReader::new(file);
        let file_len = chunk_reader.file_len()?;

        let magic = chunk_reader.read_u64_at(0)?;
        if magic != FILE_MAGIC {
            return Err(JlsError::invalid("missing JLS magic in file prologue"));
        }

        let mut registry = Registry::new();
        let mut directory = Directory::default();
        let mut cursor = PROLOGUE_LENGTH;
        let mut truncated = true;

        while cursor < file_len {
            let decoded = match chunk_reader.read_chunk(cursor) {
                Ok(d) => d,
                Err(JlsError::IoCorrupt { offset }) => {
                    tracing::warn!(offset, "corrupt chunk encountered, stopping directory scan");
                    break;
                }
                Err(e) => return Err(e),
            };
            let Some(tag) = Tag::from_u8(decoded.header.tag) else {
                tracing::warn!(tag = decoded.header.tag, "unknown chunk tag, skipping");
                cursor += padded_len(decoded.header.payload_length);
                continue;
            };
            match tag {
                Tag::End => {
                    truncated = false;
                    break;
                }
                Tag::SourceDef => {
                    let def = decode_source_def(&decoded.payload)?;
                    registry.source_define(def)?;
                }
                Tag::SignalDef => {
                    let signal_id = decoded.header.chunk_meta;
                    let def = decode_signal_def(signal_id, &decoded.payload)?;
                    registry.signal_define(def)?;
                }
                Tag::Data => {
                    let (signal_id, _level) = signal_level_from_meta(decoded.header.chunk_meta);
                    directory.data.entry(signal_id).or_default().push(decoded.offset);
                }
                Tag::Summary => {
                    let (signal_id, level) = signal_level_from_meta(decoded.header.chunk_meta);
                    let levels = directory.summary.entry(signal_id).or_default();
                    let idx = level as usize - 1;
                    while levels.len() <= idx {
                        levels.push(Vec::new());
                    }
                    levels[idx].push(decoded.offset);
                }
                Tag::Index => {
                    // Not consulted by this reader's range-statistics path;
                    // each level's SUMMARY chain alone fully reconstructs
                    // the entry sequence in file order.
                }
                Tag::Utc => {
                    let (signal_id, _level) = signal_level_from_meta(decoded.header.chunk_meta);
                    directory.utc.entry(signal_id).or_default().push(decoded.offset);
                }
                Tag::Annotation => {
                    let (signal_id, _level) = signal_level_from_meta(decoded.header.chunk_meta);
                    directory
                        .annotation
                        .entry(signal_id)
                        .or_default()
                        .push(decoded.offset);
                }
                Tag::UserData => {
                    let (signal_id, _level) = signal_level_from_meta(decoded.header.chunk_meta);
                    directory
                        .user_data
                        .entry(signal_id)
                        .or_default()
                        .push(decoded.offset);
                }
                Tag::TrackDef | Tag::TrackHead => {
                    tracing::debug!(tag = decoded.header.tag, "skipping unemitted legacy tag");
                }
            }
            cursor += padded_len(decoded.header.payload_length);
        }
        if truncated {
            tracing::warn!("file missing END chunk; directory reconstructed by forward scan");
        }

        let mut tracks = HashMap::new();
        let mut utc = HashMap::new();
        for def in registry.signals() {
            if def.signal_id == 0 {
                continue;
            }
            if matches!(def.kind, SignalKind::Fsr) {
                let data_offsets = directory.data.get(&def.signal_id).cloned().unwrap_or_default();
                let summary_offsets = directory
                    .summary
                    .get(&def.signal_id)
                    .cloned()
                    .unwrap_or_default();
                let track = TrackReader::build(def, &mut chunk_reader, &data_offsets, &summary_offsets)?;
                tracks.insert(def.signal_id, track);
            }

            let utc_offsets = directory.utc.get(&def.signal_id).cloned().unwrap_or_default();
            let mut pairs = Vec::new();
            for offset in utc_offsets {
                let decoded = chunk_reader.read_chunk(offset)?;
                let mut c = &decoded.payload[..];
                let n = c.read_u32::<LittleEndian>()? as usize;
                for _ in 0..n {
                    let sid = c.read_i64::<LittleEndian>()?;
                    let ts = c.read_i64::<LittleEndian>()?;
                    pairs.push((sid, ts));
                }
            }
            utc.insert(def.signal_id, UtcReader::build(pairs, def.sample_rate));
        }

        Ok(Reader {
            chunk_reader,
            registry,
            tracks,
            utc,
            directory,
            truncated,
        })
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceDef> {
        self.registry.sources()
    }

    pub fn signals(&self) -> impl Iterator<Item = &SignalDef> {
        self.registry.signals()
    }

    pub fn signal(&self, signal_id: u16) -> Result<&SignalDef> {
        self.registry.signal(signal_id)
    }

    fn require_fsr_track(&self, signal_id: u16) -> Result<()> {
        if matches!(self.registry.signal(signal_id)?.kind, SignalKind::Vsr) {
            return Err(JlsError::unsupported("VSR sample ingestion"));
        }
        Ok(())
    }

    pub fn length(&self, signal_id: u16) -> Result<u64> {
        self.require_fsr_track(signal_id)?;
        Ok(self
            .tracks
            .get(&signal_id)
            .ok_or_else(|| JlsError::not_found(format!("signal {signal_id}")))?
            .total_length())
    }

    pub fn read(&mut self, signal_id: u16, start: i64, count: u64, dst: &mut [u64]) -> Result<()> {
        self.require_fsr_track(signal_id)?;
        let chunk_reader = &mut self.chunk_reader;
        self.tracks
            .get(&signal_id)
            .ok_or_else(|| JlsError::not_found(format!("signal {signal_id}")))?
            .read(chunk_reader, start, count, dst)
    }

    pub fn statistics(
        &mut self,
        signal_id: u16,
        start: i64,
        length: u64,
        output_count: u32,
        dst: &mut [StatsEntry],
    ) -> Result<()> {
        self.require_fsr_track(signal_id)?;
        let mut track = self
            .tracks
            .remove(&signal_id)
            .ok_or_else(|| JlsError::not_found(format!("signal {signal_id}")))?;
        let result = track.statistics(&mut self.chunk_reader, start, length, output_count, dst);
        self.tracks.insert(signal_id, track);
        result
    }

    pub fn sample_id_to_timestamp(&self, signal_id: u16, sample_id: i64) -> Result<i64> {
        self.utc
            .get(&signal_id)
            .ok_or_else(|| JlsError::not_found(format!("signal {signal_id}")))?
            .sample_id_to_timestamp(sample_id)
    }

    pub fn timestamp_to_sample_id(&self, signal_id: u16, timestamp: i64) -> Result<i64> {
        self.utc
            .get(&signal_id)
            .ok_or_else(|| JlsError::not_found(format!("signal {signal_id}")))?
            .timestamp_to_sample_id(timestamp)
    }

    pub fn read_annotations(
        &mut self,
        signal_id: u16,
        start_timestamp: i64,
        callback: impl FnMut(&AnnotationRecord) -> i32,
    ) -> Result<u64> {
        let offsets = self
            .directory
            .annotation
            .get(&signal_id)
            .cloned()
            .unwrap_or_default();
        AnnotationReader::read_annotations(&mut self.chunk_reader, &offsets, start_timestamp, callback)
    }

    pub fn read_user_data(
        &mut self,
        signal_id: u16,
        callback: impl FnMut(&UserDataRecord) -> i32,
    ) -> Result<u64> {
        let offsets = self
            .directory
            .user_data
            .get(&signal_id)
            .cloned()
            .unwrap_or_default();
        AnnotationReader::read_user_data(&mut self.chunk_reader, &offsets, callback)
    }
}

fn padded_len(payload_length: u32) -> u64 {
    let total = crate::format::CHUNK_HEADER_LENGTH + payload_length as u64;
    total.div_ceil(crate::format::CHUNK_ALIGNMENT) * crate::format::CHUNK_ALIGNMENT
}

fn decode_source_def(payload: &[u8]) -> Result<SourceDef> {
    let mut cursor = payload;
    let source_id = cursor.read_u16::<LittleEndian>()?;
    let name = read_len_prefixed_string(&mut cursor)?;
    let vendor = read_len_prefixed_string(&mut cursor)?;
    let model = read_len_prefixed_string(&mut cursor)?;
    let version = read_len_prefixed_string(&mut cursor)?;
    let serial_number = read_len_prefixed_string(&mut cursor)?;
    Ok(SourceDef {
        source_id,
        name,
        vendor,
        model,
        version,
        serial_number,
    })
}

fn decode_signal_def(signal_id: u16, payload: &[u8]) -> Result<SignalDef> {
    let mut cursor = payload;
    let source_id = cursor.read_u16::<LittleEndian>()?;
    let kind = match cursor.read_u32::<LittleEndian>()? {
        0 => SignalKind::Fsr,
        _ => SignalKind::Vsr,
    };
    let data_type = crate::datatype::DataType::from_wire(cursor.read_u32::<LittleEndian>()?)?;
    let sample_rate = cursor.read_u32::<LittleEndian>()?;
    let samples_per_data = cursor.read_u32::<LittleEndian>()?;
    let sample_decimate_factor = cursor.read_u32::<LittleEndian>()?;
    let entries_per_summary = cursor.read_u32::<LittleEndian>()?;
    let summary_decimate_factor = cursor.read_u32::<LittleEndian>()?;
    let annotation_decimate_factor = cursor.read_u32::<LittleEndian>()?;
    let utc_decimate_factor = cursor.read_u32::<LittleEndian>()?;
    let sample_id_offset = cursor.read_i64::<LittleEndian>()?;
    let name = read_len_prefixed_string(&mut cursor)?;
    let units = read_len_prefixed_string(&mut cursor)?;
    Ok(SignalDef {
        signal_id,
        source_id,
        kind,
        data_type,
        sample_rate,
        samples_per_data,
        sample_decimate_factor,
        entries_per_summary,
        summary_decimate_factor,
        annotation_decimate_factor,
        utc_decimate_factor,
        sample_id_offset,
        name,
        units,
    })
}
