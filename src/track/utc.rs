// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! UTC track: sparse `(sample_id, timestamp)` pairs and the binary-search +
//! interpolation mapping in both directions (spec.md §4.6).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::chunk::ChunkWriter;
use crate::error::{JlsError, Result};
use crate::format::{chunk_meta_signal_level, Tag};
use crate::track::ChunkChain;

/// Writer-side buffer for one signal's UTC track.
pub struct UtcWriter {
    signal_id: u16,
    utc_decimate_factor: u32,
    buffer: Vec<(i64, i64)>,
    last_offset: u64,
    chain: ChunkChain,
    closed: bool,
}

impl UtcWriter {
    pub fn new(signal_id: u16, utc_decimate_factor: u32) -> Self {
        UtcWriter {
            signal_id,
            utc_decimate_factor,
            buffer: Vec::new(),
            last_offset: 0,
            chain: ChunkChain::default(),
            closed: false,
        }
    }

    pub fn push(
        &mut self,
        chunk_writer: &mut ChunkWriter,
        sample_id: i64,
        timestamp: i64,
    ) -> Result<()> {
        if let Some(&(last_sid, _)) = self.buffer.last() {
            if sample_id < last_sid {
                return Err(JlsError::invalid("UTC entries must be non-decreasing in sample_id"));
            }
        }
        self.buffer.push((sample_id, timestamp));
        if self.buffer.len() == self.utc_decimate_factor as usize {
            self.flush(chunk_writer)?;
        }
        Ok(())
    }

    fn flush(&mut self, chunk_writer: &mut ChunkWriter) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut payload = Vec::with_capacity(4 + self.buffer.len() * 16);
        payload.write_u32::<LittleEndian>(self.buffer.len() as u32)?;
        for &(sid, ts) in &self.buffer {
            payload.write_i64::<LittleEndian>(sid)?;
            payload.write_i64::<LittleEndian>(ts)?;
        }
        let meta = chunk_meta_signal_level(self.signal_id, 0);
        let offset = chunk_writer.append_chunk(Tag::Utc, meta, self.last_offset, &payload)?;
        self.last_offset = offset;
        self.chain.push(offset);
        self.buffer.clear();
        Ok(())
    }

    pub fn close(&mut self, chunk_writer: &mut ChunkWriter) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush(chunk_writer)?;
        self.closed = true;
        Ok(())
    }
}

/// Reader-side flattened view of one signal's UTC track.
pub struct UtcReader {
    /// `(sample_id, timestamp)` pairs, ascending by both fields.
    entries: Vec<(i64, i64)>,
    sample_rate: u32,
}

impl UtcReader {
    pub fn build(entries: Vec<(i64, i64)>, sample_rate: u32) -> Self {
        UtcReader { entries, sample_rate }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bracket `key` among `entries` using `project`, returning the indices
    /// of the two entries to interpolate/extrapolate between.
    fn bracket(&self, key: i64, project: impl Fn(&(i64, i64)) -> i64) -> (usize, usize) {
        let n = self.entries.len();
        if n == 1 {
            return (0, 0);
        }
        match self
            .entries
            .binary_search_by_key(&key, &project)
        {
            Ok(i) => (i, i),
            Err(0) => (0, 1),
            Err(i) if i >= n => (n - 2, n - 1),
            Err(i) => (i - 1, i),
        }
    }

    pub fn sample_id_to_timestamp(&self, sample_id: i64) -> Result<i64> {
        if self.entries.is_empty() {
            return Err(JlsError::not_found("UTC track has no entries"));
        }
        let (lo, hi) = self.bracket(sample_id, |&(sid, _)| sid);
        if lo == hi {
            return Ok(self.entries[lo].1);
        }
        let (s0, t0) = self.entries[lo];
        let (s1, t1) = self.entries[hi];
        if s1 == s0 {
            return Ok(t0);
        }
        let frac = (sample_id - s0) as f64 / (s1 - s0) as f64;
        Ok(t0 + (frac * (t1 - t0) as f64).round() as i64)
    }

    pub fn timestamp_to_sample_id(&self, timestamp: i64) -> Result<i64> {
        if self.entries.is_empty() {
            return Err(JlsError::not_found("UTC track has no entries"));
        }
        let (lo, hi) = self.bracket(timestamp, |&(_, ts)| ts);
        if lo == hi {
            return Ok(self.entries[lo].0);
        }
        let (s0, t0) = self.entries[lo];
        let (s1, t1) = self.entries[hi];
        if t1 == t0 {
            return Ok(s0);
        }
        let frac = (timestamp - t0) as f64 / (t1 - t0) as f64;
        Ok(s0 + (frac * (s1 - s0) as f64).round() as i64)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_bracketing_entries() {
        let entries: Vec<(i64, i64)> = (0..510).map(|i| (i * 10, i * (1 << 30))).collect();
        let reader = UtcReader::build(entries, 0);
        let ts = reader.sample_id_to_timestamp(105).unwrap();
        // sample 105 sits 1/2 way between sample 100 (t=10*2^30) and 110 (t=11*2^30).
        assert_eq!(ts, (10 * (1i64 << 30) + 11 * (1i64 << 30)) / 2);

        let sid = reader.timestamp_to_sample_id(ts).unwrap();
        assert_eq!(sid, 105);
    }

    #[test]
    fn extrapolates_outside_range() {
        let entries = vec![(0i64, 0i64), (10, 1 << 30)];
        let reader = UtcReader::build(entries, 0);
        let ts = reader.sample_id_to_timestamp(20).unwrap();
        assert_eq!(ts, 2 << 30);
    }
}
