// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! JLS on-disk constants: file prologue, chunk header layout, and chunk tags.
//!
//! Using a single source of truth for these constants prevents bugs from
//! offset or tag mismatches between the writer and the reader.

/// File magic: "JLS" followed by the standard line-ending tripwire, as a
/// single big-endian-written 64-bit constant per spec.md §6.
pub const FILE_MAGIC: u64 = 0x4A4C530D_0A1A0A20;

/// Format version written into the prologue.
pub const FORMAT_VERSION: u16 = 1;

/// Total size in bytes of the fixed file prologue.
pub const PROLOGUE_LENGTH: u64 = 32;

/// Sentinel written at the start of every chunk header.
pub const CHUNK_SENTINEL: u64 = 0x9068_934A_0000_9A8B;

/// Size in bytes of a chunk header (sentinel through header_crc32).
pub const CHUNK_HEADER_LENGTH: u64 = 32;

/// Chunk payloads are zero-padded so the next header starts on this boundary.
pub const CHUNK_ALIGNMENT: u64 = 8;

/// JLS time ticks per second (2^30), per spec.md GLOSSARY.
pub const JLS_TIME_SECOND: i64 = 1 << 30;

/// Chunk tags, per spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    SourceDef = 0x80,
    SignalDef = 0x81,
    TrackDef = 0x82,
    TrackHead = 0x83,
    Data = 0x20,
    Index = 0x21,
    Summary = 0x22,
    Utc = 0x23,
    Annotation = 0x24,
    UserData = 0x25,
    End = 0xFF,
}

impl Tag {
    /// Parse a tag byte read from disk.
    pub fn from_u8(v: u8) -> Option<Tag> {
        match v {
            0x80 => Some(Tag::SourceDef),
            0x81 => Some(Tag::SignalDef),
            0x82 => Some(Tag::TrackDef),
            0x83 => Some(Tag::TrackHead),
            0x20 => Some(Tag::Data),
            0x21 => Some(Tag::Index),
            0x22 => Some(Tag::Summary),
            0x23 => Some(Tag::Utc),
            0x24 => Some(Tag::Annotation),
            0x25 => Some(Tag::UserData),
            0xFF => Some(Tag::End),
            _ => None,
        }
    }
}

/// Annotation type, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AnnotationType {
    User = 0,
    Text = 1,
    VerticalMarker = 2,
    HorizontalMarker = 3,
}

impl AnnotationType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::User),
            1 => Some(Self::Text),
            2 => Some(Self::VerticalMarker),
            3 => Some(Self::HorizontalMarker),
            _ => None,
        }
    }
}

/// Annotation/user-data payload storage type, per spec.md §3/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageType {
    Binary = 0,
    String = 1,
    Json = 2,
}

impl StorageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Binary),
            1 => Some(Self::String),
            2 => Some(Self::Json),
            _ => None,
        }
    }
}

/// Pack `(signal_id, level)` into the 16-bit `chunk_meta` field used by
/// DATA/SUMMARY chunks: low 12 bits signal_id, high 4 bits level.
pub fn chunk_meta_signal_level(signal_id: u16, level: u8) -> u16 {
    (signal_id & 0x0FFF) | ((level as u16) << 12)
}

/// Inverse of [`chunk_meta_signal_level`].
pub fn signal_level_from_meta(meta: u16) -> (u16, u8) {
    (meta & 0x0FFF, (meta >> 12) as u8)
}
