// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Top-level Writer: file lifecycle, definition dispatch, and orchestration
//! of the per-signal track writers (spec.md §4, "Top-level Writer/Reader").

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::chunk::ChunkWriter;
use crate::error::{JlsError, Result};
use crate::format::{AnnotationType, StorageType, Tag, FILE_MAGIC, FORMAT_VERSION, PROLOGUE_LENGTH};
use crate::registry::{Registry, SignalDef, SignalKind, SourceDef};
use crate::track::{AnnotationWriter, TrackWriter, UtcWriter};

fn write_len_prefixed_string(payload: &mut Vec<u8>, s: &str) -> Result<()> {
    // length includes the NUL terminator, per spec.md §6.
    let len = s.len() as u16 + 1;
    payload.write_u16::<LittleEndian>(len)?;
    payload.extend_from_slice(s.as_bytes());
    payload.push(0);
    Ok(())
}

/// Incrementally builds a JLS file: definitions first, then sample batches.
pub struct Writer {
    chunk_writer: ChunkWriter,
    registry: Registry,
    first_source_def_offset: u64,
    tracks: HashMap<u16, TrackWriter>,
    utc_tracks: HashMap<u16, UtcWriter>,
    annotation_tracks: HashMap<u16, AnnotationWriter>,
    closed: bool,
}

impl Writer {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let mut chunk_writer = ChunkWriter::create(file)?;
        // Placeholder prologue; patched once offsets are known.
        chunk_writer.write_bytes(&[0u8; PROLOGUE_LENGTH as usize])?;
        tracing::info!("JLS file created");
        Ok(Writer {
            chunk_writer,
            registry: Registry::new(),
            first_source_def_offset: 0,
            tracks: HashMap::new(),
            utc_tracks: HashMap::new(),
            annotation_tracks: HashMap::new(),
            closed: false,
        })
    }

    pub fn source_define(&mut self, def: SourceDef) -> Result<()> {
        let source_id = def.source_id;
        let mut payload = Vec::new();
        payload.write_u16::<LittleEndian>(source_id)?;
        write_len_prefixed_string(&mut payload, &def.name)?;
        write_len_prefixed_string(&mut payload, &def.vendor)?;
        write_len_prefixed_string(&mut payload, &def.model)?;
        write_len_prefixed_string(&mut payload, &def.version)?;
        write_len_prefixed_string(&mut payload, &def.serial_number)?;

        self.registry.source_define(def)?;
        let offset = self
            .chunk_writer
            .append_chunk(Tag::SourceDef, source_id, 0, &payload)?;
        if self.first_source_def_offset == 0 {
            self.first_source_def_offset = offset;
            self.chunk_writer.patch_u64(12, offset)?;
        }
        Ok(())
    }

    pub fn signal_define(&mut self, def: SignalDef) -> Result<()> {
        let signal_id = def.signal_id;
        let mut payload = Vec::new();
        payload.write_u16::<LittleEndian>(def.source_id)?;
        payload.write_u32::<LittleEndian>(match def.kind {
            SignalKind::Fsr => 0,
            SignalKind::Vsr => 1,
        })?;
        payload.write_u32::<LittleEndian>(def.data_type.to_wire())?;
        payload.write_u32::<LittleEndian>(def.sample_rate)?;
        payload.write_u32::<LittleEndian>(def.samples_per_data)?;
        payload.write_u32::<LittleEndian>(def.sample_decimate_factor)?;
        payload.write_u32::<LittleEndian>(def.entries_per_summary)?;
        payload.write_u32::<LittleEndian>(def.summary_decimate_factor)?;
        payload.write_u32::<LittleEndian>(def.annotation_decimate_factor)?;
        payload.write_u32::<LittleEndian>(def.utc_decimate_factor)?;
        payload.write_i64::<LittleEndian>(def.sample_id_offset)?;
        write_len_prefixed_string(&mut payload, &def.name)?;
        write_len_prefixed_string(&mut payload, &def.units)?;

        let utc_decimate_factor = def.utc_decimate_factor;
        self.registry.signal_define(def)?;
        let def = self.registry.signal(signal_id)?.clone();

        self.chunk_writer
            .append_chunk(Tag::SignalDef, signal_id, 0, &payload)?;

        self.tracks.insert(signal_id, TrackWriter::new(&def));
        self.utc_tracks
            .insert(signal_id, UtcWriter::new(signal_id, utc_decimate_factor));
        self.annotation_tracks
            .insert(signal_id, AnnotationWriter::new(signal_id));
        Ok(())
    }

    pub fn write_samples(&mut self, signal_id: u16, sample_id: i64, samples: &[u64]) -> Result<()> {
        if signal_id == 0 {
            return Err(JlsError::invalid("signal 0 is reserved and read-only"));
        }
        if matches!(self.registry.signal(signal_id)?.kind, SignalKind::Vsr) {
            return Err(JlsError::unsupported("VSR sample ingestion"));
        }
        let chunk_writer = &mut self.chunk_writer;
        self.tracks
            .get_mut(&signal_id)
            .ok_or_else(|| JlsError::not_found(format!("signal {signal_id}")))?
            .write(chunk_writer, sample_id, samples)
    }

    pub fn write_utc(&mut self, signal_id: u16, sample_id: i64, timestamp: i64) -> Result<()> {
        let chunk_writer = &mut self.chunk_writer;
        self.utc_tracks
            .get_mut(&signal_id)
            .ok_or_else(|| JlsError::not_found(format!("signal {signal_id}")))?
            .push(chunk_writer, sample_id, timestamp)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn write_annotation(
        &mut self,
        signal_id: u16,
        timestamp: i64,
        y: f32,
        annotation_type: AnnotationType,
        group_id: u8,
        storage_type: StorageType,
        data: Vec<u8>,
        infer_nul_terminator: bool,
    ) -> Result<u64> {
        let chunk_writer = &mut self.chunk_writer;
        self.annotation_tracks
            .get_mut(&signal_id)
            .ok_or_else(|| JlsError::not_found(format!("signal {signal_id}")))?
            .append_annotation(
                chunk_writer,
                timestamp,
                y,
                annotation_type,
                group_id,
                storage_type,
                data,
                infer_nul_terminator,
            )
    }

    pub fn write_user_data(
        &mut self,
        signal_id: u16,
        user_meta: u16,
        storage_type: StorageType,
        data: &[u8],
    ) -> Result<u64> {
        let chunk_writer = &mut self.chunk_writer;
        self.annotation_tracks
            .get_mut(&signal_id)
            .ok_or_else(|| JlsError::not_found(format!("signal {signal_id}")))?
            .append_user_data(chunk_writer, user_meta, storage_type, data)
    }

    /// Flush every track, write the END chunk, and patch the prologue.
    pub fn close(mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        // Ascending order keeps the END-chunk-adjacent tail deterministic,
        // which matters only for test reproducibility.
        let mut ids: Vec<u16> = self.tracks.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(t) = self.tracks.get_mut(&id) {
                t.close(&mut self.chunk_writer)?;
            }
            if let Some(u) = self.utc_tracks.get_mut(&id) {
                u.close(&mut self.chunk_writer)?;
            }
        }
        let end_offset = self
            .chunk_writer
            .append_chunk(Tag::End, 0, 0, &[])?;
        self.chunk_writer.patch_u64(20, end_offset)?;

        // Stamp the prologue magic/version now that offsets are final.
        let mut head = Vec::with_capacity(PROLOGUE_LENGTH as usize);
        head.write_u64::<LittleEndian>(FILE_MAGIC)?;
        head.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        head.write_u16::<LittleEndian>(0)?;
        head.write_u64::<LittleEndian>(self.first_source_def_offset)?;
        head.write_u64::<LittleEndian>(end_offset)?;
        head.write_u32::<LittleEndian>(0)?;
        self.chunk_writer.patch_bytes(0, &head)?;

        self.chunk_writer.flush()?;
        tracing::info!(end_offset, "JLS file closed");
        self.closed = true;
        Ok(())
    }
}
