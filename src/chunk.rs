// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Framed record I/O: chunk header, CRC, and the prev-offset chain.
//!
//! Every JLS chunk is a fixed 32-byte header (bit-exact, little-endian)
//! followed by a CRC-32'd payload, zero-padded to 8-byte alignment so the
//! next header starts cleanly. See spec.md §4.1 for the byte layout.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{JlsError, Result};
use crate::format::{Tag, CHUNK_ALIGNMENT, CHUNK_HEADER_LENGTH, CHUNK_SENTINEL};

/// A decoded chunk header.
#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    pub payload_length: u32,
    pub payload_crc32: u32,
    pub prev_offset: u64,
    pub tag: u8,
    pub chunk_meta: u16,
    pub header_crc32: u32,
}

impl ChunkHeader {
    /// Compute the header CRC over bytes 0..28 (sentinel through chunk_meta).
    fn compute_crc(
        payload_length: u32,
        payload_crc32: u32,
        prev_offset: u64,
        tag: u8,
        chunk_meta: u16,
    ) -> u32 {
        let mut buf = Vec::with_capacity(28);
        buf.extend_from_slice(&CHUNK_SENTINEL.to_le_bytes());
        buf.extend_from_slice(&payload_length.to_le_bytes());
        buf.extend_from_slice(&payload_crc32.to_le_bytes());
        buf.extend_from_slice(&prev_offset.to_le_bytes());
        buf.push(tag);
        buf.push(0); // reserved
        buf.extend_from_slice(&chunk_meta.to_le_bytes());
        crc32fast::hash(&buf)
    }

    fn encode(&self) -> [u8; CHUNK_HEADER_LENGTH as usize] {
        let mut buf = [0u8; CHUNK_HEADER_LENGTH as usize];
        buf[0..8].copy_from_slice(&CHUNK_SENTINEL.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_length.to_le_bytes());
        buf[12..16].copy_from_slice(&self.payload_crc32.to_le_bytes());
        buf[16..24].copy_from_slice(&self.prev_offset.to_le_bytes());
        buf[24] = self.tag;
        buf[25] = 0;
        buf[26..28].copy_from_slice(&self.chunk_meta.to_le_bytes());
        buf[28..32].copy_from_slice(&self.header_crc32.to_le_bytes());
        buf
    }
}

/// Padded length of a chunk (header + payload) on disk.
fn padded_chunk_len(payload_length: u32) -> u64 {
    let total = CHUNK_HEADER_LENGTH + payload_length as u64;
    total.div_ceil(CHUNK_ALIGNMENT) * CHUNK_ALIGNMENT
}

/// Low-level chunk framing over a single open file.
///
/// Owns the file handle and the write cursor. Does not know about chains or
/// tags beyond what's needed to stamp a header; chain bookkeeping lives in
/// [`crate::writer::Writer`] and directory reconstruction in
/// [`crate::reader::Reader`].
pub struct ChunkWriter {
    file: BufWriter<File>,
    position: u64,
}

impl ChunkWriter {
    pub fn create(file: File) -> Result<Self> {
        Ok(ChunkWriter {
            file: BufWriter::new(file),
            position: 0,
        })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Append one chunk at the current write cursor, returning its offset.
    pub fn append_chunk(
        &mut self,
        tag: Tag,
        chunk_meta: u16,
        prev_offset: u64,
        payload: &[u8],
    ) -> Result<u64> {
        let offset = self.position;
        let payload_length = payload.len() as u32;
        let payload_crc32 = crc32fast::hash(payload);
        let header_crc32 = ChunkHeader::compute_crc(
            payload_length,
            payload_crc32,
            prev_offset,
            tag as u8,
            chunk_meta,
        );
        let header = ChunkHeader {
            payload_length,
            payload_crc32,
            prev_offset,
            tag: tag as u8,
            chunk_meta,
            header_crc32,
        };
        self.file.write_all(&header.encode())?;
        self.file.write_all(payload)?;
        let padded = padded_chunk_len(payload_length);
        let pad = padded - CHUNK_HEADER_LENGTH - payload_length as u64;
        if pad > 0 {
            self.file.write_all(&vec![0u8; pad as usize])?;
        }
        self.position += padded;
        tracing::trace!(offset, tag = tag as u8, chunk_meta, len = payload_length, "chunk appended");
        Ok(offset)
    }

    /// Patch an 8-byte little-endian field at an earlier file offset. Used by
    /// the prologue finalization step only (chunk payloads themselves are
    /// never edited in place once fully written).
    pub fn patch_u64(&mut self, at: u64, value: u64) -> Result<()> {
        self.file.flush()?;
        let file = self.file.get_mut();
        let saved = file.stream_position()?;
        file.seek(SeekFrom::Start(at))?;
        file.write_u64::<LittleEndian>(value)?;
        file.seek(SeekFrom::Start(saved))?;
        Ok(())
    }

    /// Patch an arbitrary byte range at an earlier file offset.
    pub fn patch_bytes(&mut self, at: u64, bytes: &[u8]) -> Result<()> {
        self.file.flush()?;
        let file = self.file.get_mut();
        let saved = file.stream_position()?;
        file.seek(SeekFrom::Start(at))?;
        file.write_all(bytes)?;
        file.seek(SeekFrom::Start(saved))?;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> Result<File> {
        self.file.flush()?;
        Ok(self.file.into_inner().expect("buffer already flushed"))
    }
}

/// A decoded chunk read back from disk: header plus payload bytes.
pub struct DecodedChunk {
    pub offset: u64,
    pub header: ChunkHeader,
    pub payload: Vec<u8>,
}

/// Random-access chunk reader over a file opened read-only.
pub struct ChunkReader {
    file: File,
}

impl ChunkReader {
    pub fn new(file: File) -> Self {
        ChunkReader { file }
    }

    /// Read one little-endian `u64` at an arbitrary file offset, bypassing
    /// chunk framing. Used to probe the file prologue before any chunk
    /// exists to be read.
    pub fn read_u64_at(&mut self, offset: u64) -> Result<u64> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(self.file.read_u64::<LittleEndian>()?)
    }

    /// Read and CRC-validate one chunk at `offset`.
    pub fn read_chunk(&mut self, offset: u64) -> Result<DecodedChunk> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut raw_header = [0u8; CHUNK_HEADER_LENGTH as usize];
        self.file.read_exact(&mut raw_header)?;

        let sentinel = (&raw_header[0..8]).read_u64::<LittleEndian>()?;
        if sentinel != CHUNK_SENTINEL {
            return Err(JlsError::IoCorrupt { offset });
        }
        let payload_length = (&raw_header[8..12]).read_u32::<LittleEndian>()?;
        let payload_crc32 = (&raw_header[12..16]).read_u32::<LittleEndian>()?;
        let prev_offset = (&raw_header[16..24]).read_u64::<LittleEndian>()?;
        let tag = raw_header[24];
        let chunk_meta = (&raw_header[26..28]).read_u16::<LittleEndian>()?;
        let header_crc32 = (&raw_header[28..32]).read_u32::<LittleEndian>()?;

        let expect_header_crc = ChunkHeader::compute_crc(
            payload_length,
            payload_crc32,
            prev_offset,
            tag,
            chunk_meta,
        );
        if expect_header_crc != header_crc32 {
            return Err(JlsError::IoCorrupt { offset });
        }

        let mut payload = vec![0u8; payload_length as usize];
        self.file.read_exact(&mut payload)?;
        if crc32fast::hash(&payload) != payload_crc32 {
            return Err(JlsError::IoCorrupt { offset });
        }

        let header = ChunkHeader {
            payload_length,
            payload_crc32,
            prev_offset,
            tag,
            chunk_meta,
            header_crc32,
        };
        Ok(DecodedChunk {
            offset,
            header,
            payload,
        })
    }

    /// Offset of the chunk immediately following the one at `offset`, or
    /// `None` if `offset` is the last chunk (or past EOF).
    pub fn next_chunk_offset(&mut self, offset: u64, payload_length: u32) -> Option<u64> {
        let next = offset + padded_chunk_len(payload_length);
        if next < self.file_len().ok()? {
            Some(next)
        } else {
            None
        }
    }

    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn into_inner(self) -> File {
        self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Seek;

    #[test]
    fn round_trip_one_chunk() {
        let tmp = tempfile::tempfile().unwrap();
        let mut writer = ChunkWriter::create(tmp.try_clone().unwrap()).unwrap();
        let offset = writer
            .append_chunk(Tag::Data, 0x1234, 0, b"hello world")
            .unwrap();
        assert_eq!(offset, 0);
        writer.flush().unwrap();

        let mut file = tmp;
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut reader = ChunkReader::new(file);
        let decoded = reader.read_chunk(0).unwrap();
        assert_eq!(decoded.header.tag, Tag::Data as u8);
        assert_eq!(decoded.header.chunk_meta, 0x1234);
        assert_eq!(decoded.payload, b"hello world");
    }

    #[test]
    fn corrupt_payload_detected() {
        let tmp = tempfile::tempfile().unwrap();
        let mut writer = ChunkWriter::create(tmp.try_clone().unwrap()).unwrap();
        writer.append_chunk(Tag::Data, 0, 0, b"abc").unwrap();
        writer.flush().unwrap();

        let mut file = tmp;
        // Flip a byte inside the payload.
        file.seek(SeekFrom::Start(CHUNK_HEADER_LENGTH)).unwrap();
        file.write_all(&[b'X']).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut reader = ChunkReader::new(file);
        let err = reader.read_chunk(0).unwrap_err();
        assert_eq!(err.code(), JlsError::IoCorrupt { offset: 0 }.code());
    }

    #[test]
    fn chain_prev_offsets_round_trip() {
        let tmp = tempfile::tempfile().unwrap();
        let mut writer = ChunkWriter::create(tmp.try_clone().unwrap()).unwrap();
        let o1 = writer.append_chunk(Tag::Data, 0, 0, b"one").unwrap();
        let o2 = writer.append_chunk(Tag::Data, 0, o1, b"two").unwrap();
        let o3 = writer.append_chunk(Tag::Data, 0, o2, b"three").unwrap();
        writer.flush().unwrap();

        let mut file = tmp;
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut reader = ChunkReader::new(file);
        let c3 = reader.read_chunk(o3).unwrap();
        assert_eq!(c3.header.prev_offset, o2);
        let c2 = reader.read_chunk(c3.header.prev_offset).unwrap();
        assert_eq!(c2.header.prev_offset, o1);
        let c1 = reader.read_chunk(c2.header.prev_offset).unwrap();
        assert_eq!(c1.header.prev_offset, 0);
    }
}
