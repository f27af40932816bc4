// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! FSR Track Writer: admits samples, emits DATA chunks, and cascades the
//! summary pyramid level by level (spec.md §4.4).
//!
//! The cascade is modeled as an explicit work queue rather than recursive
//! calls: each completed SUMMARY chunk enqueues zero or more entries for the
//! level above, and the queue is drained in a loop. This keeps the call
//! stack flat regardless of pyramid depth.

use std::collections::VecDeque;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::chunk::ChunkWriter;
use crate::datatype::{pack, packed_byte_len, DataType};
use crate::error::Result;
use crate::format::{chunk_meta_signal_level, Tag};
use crate::registry::SignalDef;
use crate::statistics::{StatsEntry, Statistics};
use crate::track::ChunkChain;

/// Per-level bookkeeping above level 0: the entries/offsets accumulating
/// toward the next SUMMARY+INDEX chunk pair.
#[derive(Default)]
struct LevelState {
    entries: Vec<StatsEntry>,
    counts: Vec<u64>,
    index_offsets: Vec<u64>,
    last_summary_offset: u64,
    last_index_offset: u64,
    summary_chain: ChunkChain,
    index_chain: ChunkChain,
}

/// Writer-side state machine for one FSR signal.
pub struct TrackWriter {
    signal_id: u16,
    data_type: DataType,
    samples_per_data: u32,
    sample_decimate_factor: u32,
    entries_per_summary: u32,
    summary_decimate_factor: u32,
    sample_id_offset: i64,
    write_sample_id: i64,
    level0_buffer: Vec<u64>,
    last_data_offset: u64,
    data_chain: ChunkChain,
    levels: Vec<LevelState>,
    closed: bool,
}

/// A pending entry waiting to be folded into a level's buffer.
struct PendingEntry {
    level_idx: usize,
    entry: StatsEntry,
    count: u64,
    source_offset: u64,
}

impl TrackWriter {
    pub fn new(def: &SignalDef) -> Self {
        TrackWriter {
            signal_id: def.signal_id,
            data_type: def.data_type,
            samples_per_data: def.samples_per_data,
            sample_decimate_factor: def.sample_decimate_factor,
            entries_per_summary: def.entries_per_summary,
            summary_decimate_factor: def.summary_decimate_factor,
            sample_id_offset: def.sample_id_offset,
            write_sample_id: def.sample_id_offset,
            level0_buffer: Vec::with_capacity(def.samples_per_data as usize),
            last_data_offset: 0,
            data_chain: ChunkChain::default(),
            levels: Vec::new(),
            closed: false,
        }
    }

    pub fn next_sample_id(&self) -> i64 {
        self.write_sample_id
    }

    pub fn data_chain(&self) -> &ChunkChain {
        &self.data_chain
    }

    /// The fill carrier used for a skipped-sample gap, per spec.md §4.4/§9.
    fn fill_carrier(dt: DataType) -> u64 {
        match dt {
            DataType::F32 => f32::NAN.to_bits() as u64,
            DataType::F64 => f64::NAN.to_bits(),
            DataType::U1 => 0,
            other => other.min_value_carrier(),
        }
    }

    /// Admit `count` contiguous samples starting at absolute `sample_id`.
    pub fn write(
        &mut self,
        chunk_writer: &mut ChunkWriter,
        sample_id: i64,
        samples: &[u64],
    ) -> Result<()> {
        if self.closed {
            return Err(crate::error::JlsError::invalid("track already closed"));
        }
        if sample_id < self.write_sample_id {
            return Err(crate::error::JlsError::invalid(format!(
                "sample_id {sample_id} precedes next expected id {}",
                self.write_sample_id
            )));
        }
        if sample_id > self.write_sample_id {
            let gap = (sample_id - self.write_sample_id) as u64;
            let fill = Self::fill_carrier(self.data_type);
            tracing::debug!(signal_id = self.signal_id, gap, "sample skip, filling gap");
            for _ in 0..gap {
                self.push_raw_sample(chunk_writer, fill)?;
            }
        }
        for &s in samples {
            self.push_raw_sample(chunk_writer, s)?;
        }
        Ok(())
    }

    fn push_raw_sample(&mut self, chunk_writer: &mut ChunkWriter, carrier: u64) -> Result<()> {
        self.level0_buffer.push(carrier);
        self.write_sample_id += 1;
        if self.level0_buffer.len() == self.samples_per_data as usize {
            self.flush_data_chunk(chunk_writer)?;
        }
        Ok(())
    }

    fn flush_data_chunk(&mut self, chunk_writer: &mut ChunkWriter) -> Result<()> {
        let sample_id_start = self.write_sample_id - self.level0_buffer.len() as i64;

        let mut payload = Vec::with_capacity(12 + self.level0_buffer.len());
        payload.write_i64::<LittleEndian>(sample_id_start)?;
        // True sample count, distinct from the packed byte length: a partial
        // final chunk (spec.md §3) is never padded up to `samples_per_data`,
        // and for bit-packed types the packed length alone rounds up to a
        // whole byte and can't recover an exact count smaller than that.
        payload.write_u32::<LittleEndian>(self.level0_buffer.len() as u32)?;
        let bits = self.data_type.bit_width() as usize;
        let packed_len = packed_byte_len(bits, self.level0_buffer.len(), 0);
        let mut packed = vec![0u8; packed_len];
        pack(self.data_type, &self.level0_buffer, &mut packed, 0);
        payload.extend_from_slice(&packed);

        let meta = chunk_meta_signal_level(self.signal_id, 0);
        let offset =
            chunk_writer.append_chunk(Tag::Data, meta, self.last_data_offset, &payload)?;
        self.last_data_offset = offset;
        self.data_chain.push(offset);

        let mut queue = VecDeque::new();
        let sub_len = self.sample_decimate_factor as usize;
        for sub in self.level0_buffer.chunks(sub_len) {
            let values: Vec<f64> = sub
                .iter()
                .map(|&c| self.data_type.promote_to_f64(c))
                .collect();
            let stats = Statistics::compute(&values);
            queue.push_back(PendingEntry {
                level_idx: 0,
                entry: stats.finalize(),
                count: values.len() as u64,
                source_offset: offset,
            });
        }
        self.level0_buffer.clear();
        self.drain_cascade(chunk_writer, queue)
    }

    fn ensure_level(&mut self, idx: usize) {
        while self.levels.len() <= idx {
            self.levels.push(LevelState::default());
        }
    }

    /// Drain the cascade work queue, folding entries into their level's
    /// buffer and flushing + re-enqueueing whenever a level fills.
    fn drain_cascade(
        &mut self,
        chunk_writer: &mut ChunkWriter,
        mut queue: VecDeque<PendingEntry>,
    ) -> Result<()> {
        while let Some(pending) = queue.pop_front() {
            self.ensure_level(pending.level_idx);
            let lvl = &mut self.levels[pending.level_idx];
            lvl.entries.push(pending.entry);
            lvl.counts.push(pending.count);
            lvl.index_offsets.push(pending.source_offset);

            if lvl.entries.len() == self.entries_per_summary as usize {
                let (summary_offset, entries, counts) =
                    self.flush_summary(chunk_writer, pending.level_idx)?;
                let group = self.summary_decimate_factor as usize;
                for (es, cs) in entries.chunks(group).zip(counts.chunks(group)) {
                    let mut acc = Statistics::new();
                    for (e, &c) in es.iter().zip(cs) {
                        acc.merge(&Statistics::from_entry(e, c));
                    }
                    queue.push_back(PendingEntry {
                        level_idx: pending.level_idx + 1,
                        entry: acc.finalize(),
                        count: acc.count(),
                        source_offset: summary_offset,
                    });
                }
            }
        }
        Ok(())
    }

    /// Write this level's SUMMARY and INDEX chunks, returning the SUMMARY
    /// chunk's offset plus the entries/counts just flushed (for cascading).
    fn flush_summary(
        &mut self,
        chunk_writer: &mut ChunkWriter,
        level_idx: usize,
    ) -> Result<(u64, Vec<StatsEntry>, Vec<u64>)> {
        let lvl = &mut self.levels[level_idx];
        let entries = std::mem::take(&mut lvl.entries);
        let counts = std::mem::take(&mut lvl.counts);
        let index_offsets = std::mem::take(&mut lvl.index_offsets);

        let mut summary_payload = Vec::with_capacity(4 + entries.len() * 32);
        summary_payload.write_u32::<LittleEndian>(entries.len() as u32)?;
        for e in &entries {
            summary_payload.write_f64::<LittleEndian>(e.mean)?;
            summary_payload.write_f64::<LittleEndian>(e.min)?;
            summary_payload.write_f64::<LittleEndian>(e.max)?;
            summary_payload.write_f64::<LittleEndian>(e.std)?;
        }
        let level = (level_idx + 1) as u8;
        let meta = chunk_meta_signal_level(self.signal_id, level);
        let summary_offset = chunk_writer.append_chunk(
            Tag::Summary,
            meta,
            self.levels[level_idx].last_summary_offset,
            &summary_payload,
        )?;
        self.levels[level_idx].last_summary_offset = summary_offset;
        self.levels[level_idx].summary_chain.push(summary_offset);

        let mut index_payload = Vec::with_capacity(4 + index_offsets.len() * 8);
        index_payload.write_u32::<LittleEndian>(index_offsets.len() as u32)?;
        for off in &index_offsets {
            index_payload.write_i64::<LittleEndian>(*off as i64)?;
        }
        let index_offset = chunk_writer.append_chunk(
            Tag::Index,
            meta,
            self.levels[level_idx].last_index_offset,
            &index_payload,
        )?;
        self.levels[level_idx].last_index_offset = index_offset;
        self.levels[level_idx].index_chain.push(index_offset);

        tracing::trace!(
            signal_id = self.signal_id,
            level,
            entries = entries.len(),
            "summary cascade flushed"
        );
        Ok((summary_offset, entries, counts))
    }

    /// Flush every partial buffer: level 0 is written with its true,
    /// unpadded length, higher levels emit whatever they hold (spec.md §3,
    /// §4.4 item 4).
    pub fn close(&mut self, chunk_writer: &mut ChunkWriter) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if !self.level0_buffer.is_empty() {
            self.flush_data_chunk(chunk_writer)?;
        }
        let mut idx = 0;
        while idx < self.levels.len() {
            if !self.levels[idx].entries.is_empty() {
                let (summary_offset, entries, counts) = self.flush_summary(chunk_writer, idx)?;
                // Partial cascade: whatever remains forms one final group,
                // regardless of summary_decimate_factor alignment.
                let mut acc = Statistics::new();
                for (e, &c) in entries.iter().zip(&counts) {
                    acc.merge(&Statistics::from_entry(e, c));
                }
                if acc.count() > 0 {
                    let queue = VecDeque::from([PendingEntry {
                        level_idx: idx + 1,
                        entry: acc.finalize(),
                        count: acc.count(),
                        source_offset: summary_offset,
                    }]);
                    self.drain_cascade(chunk_writer, queue)?;
                }
            }
            idx += 1;
        }
        self.closed = true;
        tracing::debug!(signal_id = self.signal_id, total = %(self.write_sample_id - self.sample_id_offset), "track closed");
        Ok(())
    }
}
