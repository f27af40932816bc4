// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Annotation and user-data tracks: independent doubly-linked chunk chains
//! per signal, walked forward with a callback (spec.md §4.7).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::chunk::ChunkReader;
use crate::chunk::ChunkWriter;
use crate::error::Result;
use crate::format::{chunk_meta_signal_level, AnnotationType, StorageType, Tag};
use crate::track::ChunkChain;

/// One decoded ANNOTATION chunk.
#[derive(Debug, Clone)]
pub struct AnnotationRecord {
    pub timestamp: i64,
    pub y: f32,
    pub annotation_type: AnnotationType,
    pub group_id: u8,
    pub storage_type: StorageType,
    pub data: Vec<u8>,
}

/// One decoded USER_DATA chunk.
#[derive(Debug, Clone)]
pub struct UserDataRecord {
    pub chunk_meta: u16,
    pub storage_type: StorageType,
    pub data: Vec<u8>,
}

/// Appends ANNOTATION or USER_DATA chunks for one signal.
pub struct AnnotationWriter {
    signal_id: u16,
    last_annotation_offset: u64,
    last_user_data_offset: u64,
    annotation_chain: ChunkChain,
    user_data_chain: ChunkChain,
}

impl AnnotationWriter {
    pub fn new(signal_id: u16) -> Self {
        AnnotationWriter {
            signal_id,
            last_annotation_offset: 0,
            last_user_data_offset: 0,
            annotation_chain: ChunkChain::default(),
            user_data_chain: ChunkChain::default(),
        }
    }

    /// `infer_nul_terminator` mirrors the C API's `data_length == 0`
    /// sentinel (spec.md §6): when true and `storage_type` is String/Json,
    /// a trailing NUL is appended if `data` doesn't already end in one. When
    /// false, `data` is stored exactly as given — callers that pass their
    /// own exact byte buffer (e.g. a JSON blob not meant to carry a NUL) get
    /// it back unmodified.
    pub fn append_annotation(
        &mut self,
        chunk_writer: &mut ChunkWriter,
        timestamp: i64,
        y: f32,
        annotation_type: AnnotationType,
        group_id: u8,
        storage_type: StorageType,
        mut data: Vec<u8>,
        infer_nul_terminator: bool,
    ) -> Result<u64> {
        if infer_nul_terminator
            && matches!(storage_type, StorageType::String | StorageType::Json)
            && data.last() != Some(&0)
        {
            data.push(0);
        }
        let mut payload = Vec::with_capacity(24 + data.len());
        payload.write_i64::<LittleEndian>(timestamp)?;
        payload.write_f32::<LittleEndian>(y)?;
        payload.write_u8(annotation_type as u8)?;
        payload.write_u8(group_id)?;
        payload.write_u8(storage_type as u8)?;
        payload.write_u8(0)?;
        payload.write_u32::<LittleEndian>(data.len() as u32)?;
        payload.extend_from_slice(&data);

        let meta = chunk_meta_signal_level(self.signal_id, 0);
        let offset = chunk_writer.append_chunk(
            Tag::Annotation,
            meta,
            self.last_annotation_offset,
            &payload,
        )?;
        self.last_annotation_offset = offset;
        self.annotation_chain.push(offset);
        Ok(offset)
    }

    pub fn append_user_data(
        &mut self,
        chunk_writer: &mut ChunkWriter,
        user_meta: u16,
        storage_type: StorageType,
        data: &[u8],
    ) -> Result<u64> {
        let mut payload = Vec::with_capacity(8 + data.len());
        payload.write_u16::<LittleEndian>(user_meta)?;
        payload.write_u8(storage_type as u8)?;
        payload.write_u8(0)?;
        payload.write_u32::<LittleEndian>(data.len() as u32)?;
        payload.extend_from_slice(data);

        let meta = chunk_meta_signal_level(self.signal_id, 0);
        let offset = chunk_writer.append_chunk(
            Tag::UserData,
            meta,
            self.last_user_data_offset,
            &payload,
        )?;
        self.last_user_data_offset = offset;
        self.user_data_chain.push(offset);
        Ok(offset)
    }

    pub fn annotation_chain(&self) -> &ChunkChain {
        &self.annotation_chain
    }

    pub fn user_data_chain(&self) -> &ChunkChain {
        &self.user_data_chain
    }
}

/// Reads ANNOTATION/USER_DATA chains built from the forward-scan directory.
pub struct AnnotationReader;

impl AnnotationReader {
    fn decode_annotation(payload: &[u8]) -> Result<AnnotationRecord> {
        let mut cursor = payload;
        let timestamp = cursor.read_i64::<LittleEndian>()?;
        let y = cursor.read_f32::<LittleEndian>()?;
        let annotation_type = AnnotationType::from_u8(cursor.read_u8()?)
            .ok_or_else(|| crate::error::JlsError::invalid("unknown annotation_type"))?;
        let group_id = cursor.read_u8()?;
        let storage_type = StorageType::from_u8(cursor.read_u8()?)
            .ok_or_else(|| crate::error::JlsError::invalid("unknown storage_type"))?;
        let _reserved = cursor.read_u8()?;
        let data_length = cursor.read_u32::<LittleEndian>()? as usize;
        let data = cursor[..data_length].to_vec();
        Ok(AnnotationRecord {
            timestamp,
            y,
            annotation_type,
            group_id,
            storage_type,
            data,
        })
    }

    fn decode_user_data(payload: &[u8]) -> Result<UserDataRecord> {
        let mut cursor = payload;
        let chunk_meta = cursor.read_u16::<LittleEndian>()?;
        let storage_type = StorageType::from_u8(cursor.read_u8()?)
            .ok_or_else(|| crate::error::JlsError::invalid("unknown storage_type"))?;
        let _reserved = cursor.read_u8()?;
        let data_length = cursor.read_u32::<LittleEndian>()? as usize;
        let data = cursor[..data_length].to_vec();
        Ok(UserDataRecord {
            chunk_meta,
            storage_type,
            data,
        })
    }

    /// Walk the annotation chain forward from the first entry whose
    /// timestamp is `>= start_timestamp`, invoking `callback` on each. A
    /// non-zero callback return aborts iteration without error; the visited
    /// count is returned either way.
    pub fn read_annotations(
        chunk_reader: &mut ChunkReader,
        chain_offsets: &[u64],
        start_timestamp: i64,
        mut callback: impl FnMut(&AnnotationRecord) -> i32,
    ) -> Result<u64> {
        let mut visited = 0u64;
        let mut started = false;
        for &offset in chain_offsets {
            let decoded = chunk_reader.read_chunk(offset)?;
            let record = Self::decode_annotation(&decoded.payload)?;
            if !started {
                if record.timestamp < start_timestamp {
                    continue;
                }
                started = true;
            }
            visited += 1;
            if callback(&record) != 0 {
                break;
            }
        }
        Ok(visited)
    }

    pub fn read_user_data(
        chunk_reader: &mut ChunkReader,
        chain_offsets: &[u64],
        mut callback: impl FnMut(&UserDataRecord) -> i32,
    ) -> Result<u64> {
        let mut visited = 0u64;
        for &offset in chain_offsets {
            let decoded = chunk_reader.read_chunk(offset)?;
            let record = Self::decode_user_data(&decoded.payload)?;
            visited += 1;
            if callback(&record) != 0 {
                break;
            }
        }
        Ok(visited)
    }
}
