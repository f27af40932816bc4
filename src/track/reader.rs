// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! FSR Track Reader: random-access sample fetch and range statistics over
//! the summary pyramid (spec.md §4.5).

use std::collections::HashMap;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::chunk::ChunkReader;
use crate::datatype::{packed_byte_len, unpack, DataType};
use crate::error::{JlsError, Result};
use crate::registry::SignalDef;
use crate::statistics::{StatsEntry, Statistics};

#[derive(Debug, Clone, Copy)]
struct DataChunkMeta {
    start: i64,
    offset: u64,
    /// True sample count this chunk holds; equal to `samples_per_data` for
    /// every chunk except possibly the last (spec.md §3).
    length: u32,
}

/// Reader-side view of one FSR signal's chunk directory.
pub struct TrackReader {
    signal_id: u16,
    data_type: DataType,
    sample_decimate_factor: u32,
    summary_decimate_factor: u32,
    sample_id_offset: i64,
    total_length: u64,
    data_chunks: Vec<DataChunkMeta>,
    /// offsets of this signal's SUMMARY chunks, indexed `[level - 1]`, in
    /// write order.
    summary_chain: Vec<Vec<u64>>,
    /// lazily-materialized flattened entries per level, keyed by level.
    level_cache: HashMap<u8, Vec<StatsEntry>>,
}

impl TrackReader {
    /// Build from the forward-scan directory: `data_offsets` and
    /// `summary_offsets_by_level` are this signal's chunk offsets in write
    /// (ascending file-offset) order.
    pub fn build(
        def: &SignalDef,
        chunk_reader: &mut ChunkReader,
        data_offsets: &[u64],
        summary_offsets_by_level: &[Vec<u64>],
    ) -> Result<Self> {
        let mut data_chunks = Vec::with_capacity(data_offsets.len());
        for &offset in data_offsets {
            let decoded = chunk_reader.read_chunk(offset)?;
            let mut header = &decoded.payload[0..12];
            let start = header.read_i64::<LittleEndian>()?;
            let length = header.read_u32::<LittleEndian>()?;
            data_chunks.push(DataChunkMeta { start, offset, length });
        }
        data_chunks.sort_by_key(|c| c.start);

        let total_length = match data_chunks.last() {
            Some(last) => (last.start - def.sample_id_offset) as u64 + last.length as u64,
            None => 0,
        };

        Ok(TrackReader {
            signal_id: def.signal_id,
            data_type: def.data_type,
            sample_decimate_factor: def.sample_decimate_factor,
            summary_decimate_factor: def.summary_decimate_factor,
            sample_id_offset: def.sample_id_offset,
            total_length,
            data_chunks,
            summary_chain: summary_offsets_by_level.to_vec(),
            level_cache: HashMap::new(),
        })
    }

    pub fn signal_id(&self) -> u16 {
        self.signal_id
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Number of raw samples one level-`level` summary entry covers
    /// (level 0 means "one raw sample").
    fn span(&self, level: u32) -> u64 {
        if level == 0 {
            return 1;
        }
        let mut span = self.sample_decimate_factor as u64;
        for _ in 1..level {
            span *= self.summary_decimate_factor as u64;
        }
        span
    }

    fn max_level(&self) -> u32 {
        self.summary_chain.len() as u32
    }

    /// Binary search `data_chunks` for the chunk containing sample `sid`.
    fn chunk_index_for(&self, sid: i64) -> Option<usize> {
        if self.data_chunks.is_empty() {
            return None;
        }
        match self
            .data_chunks
            .binary_search_by_key(&sid, |c| c.start)
        {
            Ok(i) => Some(i),
            Err(0) => None,
            Err(i) => {
                let cand = i - 1;
                let meta = self.data_chunks[cand];
                if sid >= meta.start && sid < meta.start + meta.length as i64 {
                    Some(cand)
                } else {
                    None
                }
            }
        }
    }

    /// Fetch `count` raw samples starting at absolute `start` into `dst` as
    /// `u64` carriers, crossing DATA chunk boundaries as needed.
    pub fn read(
        &self,
        chunk_reader: &mut ChunkReader,
        start: i64,
        count: u64,
        dst: &mut [u64],
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if start < self.sample_id_offset
            || (start - self.sample_id_offset) as u64 + count > self.total_length
        {
            return Err(JlsError::invalid(format!(
                "read range [{start}, {}) out of bounds (length {})",
                start + count as i64,
                self.total_length
            )));
        }
        let mut remaining = count as usize;
        let mut cursor = start;
        let mut dst_pos = 0usize;
        while remaining > 0 {
            let idx = self
                .chunk_index_for(cursor)
                .ok_or_else(|| JlsError::invalid(format!("no DATA chunk covers sample {cursor}")))?;
            let meta = self.data_chunks[idx];
            let decoded = chunk_reader.read_chunk(meta.offset)?;
            let offset_in_chunk = (cursor - meta.start) as usize;
            let available = meta.length as usize - offset_in_chunk;
            let take = remaining.min(available);

            let bits = self.data_type.bit_width() as usize;
            let bit_offset = offset_in_chunk * bits;
            unpack(
                self.data_type,
                &decoded.payload[12..],
                bit_offset,
                take,
                &mut dst[dst_pos..dst_pos + take],
            );

            cursor += take as i64;
            dst_pos += take;
            remaining -= take;
        }
        Ok(())
    }

    /// Materialize (and cache) the full, flattened entry list for `level`.
    fn level_entries(
        &mut self,
        chunk_reader: &mut ChunkReader,
        level: u8,
    ) -> Result<&[StatsEntry]> {
        if !self.level_cache.contains_key(&level) {
            let mut flat = Vec::new();
            if let Some(offsets) = self.summary_chain.get((level - 1) as usize) {
                for &offset in offsets {
                    let decoded = chunk_reader.read_chunk(offset)?;
                    let mut cursor = &decoded.payload[..];
                    let n = cursor.read_u32::<LittleEndian>()? as usize;
                    for _ in 0..n {
                        let mean = cursor.read_f64::<LittleEndian>()?;
                        let min = cursor.read_f64::<LittleEndian>()?;
                        let max = cursor.read_f64::<LittleEndian>()?;
                        let std = cursor.read_f64::<LittleEndian>()?;
                        flat.push(StatsEntry { mean, min, max, std });
                    }
                }
            }
            self.level_cache.insert(level, flat);
        }
        Ok(self.level_cache.get(&level).unwrap())
    }

    fn raw_statistics(
        &self,
        chunk_reader: &mut ChunkReader,
        start: i64,
        length: u64,
    ) -> Result<StatsEntry> {
        let mut carriers = vec![0u64; length as usize];
        self.read(chunk_reader, start, length, &mut carriers)?;
        let values: Vec<f64> = carriers
            .iter()
            .map(|&c| self.data_type.promote_to_f64(c))
            .collect();
        Ok(Statistics::compute(&values).finalize())
    }

    /// Statistics over `[start, start+length)`, decomposed into head/body/tail
    /// against the deepest summary level whose entry span fits (spec.md §4.5).
    fn range_statistics(
        &mut self,
        chunk_reader: &mut ChunkReader,
        start: i64,
        length: u64,
    ) -> Result<StatsEntry> {
        if length == 0 {
            return Ok(StatsEntry {
                mean: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
                std: f64::NAN,
            });
        }

        let mut level = 0u32;
        for l in (1..=self.max_level()).rev() {
            if self.span(l) <= length {
                level = l;
                break;
            }
        }
        if level == 0 {
            return self.raw_statistics(chunk_reader, start, length);
        }

        let span = self.span(level);
        let rel = (start - self.sample_id_offset) as u64;
        let a_aligned = if rel % span == 0 {
            start
        } else {
            start + (span - rel % span) as i64
        };
        let end = start + length as i64;
        let end_rel = (end - self.sample_id_offset) as u64;
        let b_aligned = end - (end_rel % span) as i64;

        let mut acc = Statistics::new();

        if a_aligned > start {
            let head_len = (a_aligned - start) as u64;
            let head = self.range_statistics(chunk_reader, start, head_len)?;
            acc.merge(&Statistics::from_entry(&head, head_len));
        }

        if b_aligned > a_aligned {
            let first_idx = ((a_aligned - self.sample_id_offset) as u64 / span) as usize;
            let n_entries = ((b_aligned - a_aligned) as u64 / span) as usize;
            let entries = self.level_entries(chunk_reader, level as u8)?;
            let end_idx = (first_idx + n_entries).min(entries.len());
            for e in &entries[first_idx.min(entries.len())..end_idx] {
                acc.merge(&Statistics::from_entry(e, span));
            }
        }

        if end > b_aligned {
            let tail_len = (end - b_aligned) as u64;
            let tail = self.range_statistics(chunk_reader, b_aligned, tail_len)?;
            acc.merge(&Statistics::from_entry(&tail, tail_len));
        }

        Ok(acc.finalize())
    }

    /// Public entry point: `output_count` statistics entries each covering
    /// `length / output_count` samples (remainder absorbed by the last).
    pub fn statistics(
        &mut self,
        chunk_reader: &mut ChunkReader,
        start: i64,
        length: u64,
        output_count: u32,
        dst: &mut [StatsEntry],
    ) -> Result<()> {
        if output_count == 0
            || start < self.sample_id_offset
            || (start - self.sample_id_offset) as u64 + length > self.total_length
        {
            return Err(JlsError::invalid("statistics range out of bounds"));
        }
        let base = length / output_count as u64;
        let remainder = length % output_count as u64;
        let mut cursor = start;
        for i in 0..output_count as usize {
            let this_len = if i == output_count as usize - 1 {
                base + remainder
            } else {
                base
            };
            dst[i] = self.range_statistics(chunk_reader, cursor, this_len)?;
            cursor += this_len as i64;
        }
        Ok(())
    }

    /// Bytes needed to hold `count` packed samples; exposed for callers
    /// building their own DATA-chunk-shaped buffers in tests.
    pub fn packed_len(&self, count: usize) -> usize {
        packed_byte_len(self.data_type.bit_width() as usize, count, 0)
    }
}
