// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Error types for JLS file I/O.
//!
//! Mirrors the stable error codes of spec.md §6 so that embedders translating
//! to an FFI boundary can recover the original integer without matching on
//! variant names.

use std::fmt;

/// Errors that can occur while reading or writing a JLS file.
#[derive(Debug)]
#[non_exhaustive]
pub enum JlsError {
    /// A source or signal with the given id has already been defined.
    AlreadyExists {
        /// "source" or "signal"
        kind: &'static str,
        /// The id that was already present.
        id: u16,
    },
    /// A referenced source, signal, or entry does not exist.
    NotFound {
        /// What was being looked up.
        what: String,
    },
    /// An argument was out of range or otherwise invalid.
    ParameterInvalid {
        /// Description of the invalid parameter.
        reason: String,
    },
    /// Underlying I/O failure.
    Io(std::io::Error),
    /// A chunk's CRC (header or payload) did not match.
    IoCorrupt {
        /// File offset of the corrupt chunk.
        offset: u64,
    },
    /// The file is missing its END chunk; directory was reconstructed by
    /// forward scan.
    IoTruncated,
    /// The requested operation or data type is not supported.
    Unsupported {
        /// What is not supported.
        feature: String,
    },
    /// An allocation failed or would exceed a bound.
    NotEnoughMemory,
}

impl JlsError {
    /// Create an "already exists" error for a source definition.
    pub fn source_exists(id: u16) -> Self {
        JlsError::AlreadyExists { kind: "source", id }
    }

    /// Create an "already exists" error for a signal definition.
    pub fn signal_exists(id: u16) -> Self {
        JlsError::AlreadyExists { kind: "signal", id }
    }

    /// Create a "not found" error.
    pub fn not_found(what: impl Into<String>) -> Self {
        JlsError::NotFound { what: what.into() }
    }

    /// Create a "parameter invalid" error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        JlsError::ParameterInvalid {
            reason: reason.into(),
        }
    }

    /// Create an "unsupported" error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        JlsError::Unsupported {
            feature: feature.into(),
        }
    }

    /// The stable integer error code from spec.md §6.
    pub fn code(&self) -> i32 {
        match self {
            JlsError::AlreadyExists { .. } => 1,
            JlsError::NotFound { .. } => 2,
            JlsError::ParameterInvalid { .. } => 3,
            JlsError::Io(_) => 4,
            JlsError::IoCorrupt { .. } => 5,
            JlsError::IoTruncated => 6,
            JlsError::Unsupported { .. } => 7,
            JlsError::NotEnoughMemory => 8,
        }
    }
}

impl fmt::Display for JlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JlsError::AlreadyExists { kind, id } => {
                write!(f, "{kind} {id} already defined")
            }
            JlsError::NotFound { what } => write!(f, "not found: {what}"),
            JlsError::ParameterInvalid { reason } => write!(f, "invalid parameter: {reason}"),
            JlsError::Io(e) => write!(f, "I/O error: {e}"),
            JlsError::IoCorrupt { offset } => {
                write!(f, "corrupt chunk at offset {offset}: CRC mismatch")
            }
            JlsError::IoTruncated => write!(f, "file truncated: missing END chunk"),
            JlsError::Unsupported { feature } => write!(f, "unsupported: {feature}"),
            JlsError::NotEnoughMemory => write!(f, "allocation failed"),
        }
    }
}

impl std::error::Error for JlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JlsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for JlsError {
    fn from(err: std::io::Error) -> Self {
        JlsError::Io(err)
    }
}

/// Result type for JLS operations.
pub type Result<T> = std::result::Result<T, JlsError>;
