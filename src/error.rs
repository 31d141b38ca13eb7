//! Error types for metadata serialization and loading.
//!
//! Every failure here is fatal for the output file being produced: the
//! serializer is a pure transform, so there is no degraded or partial mode.
//! Absent optional data (an empty method list, a property without a setter)
//! is never an error; it is encoded as the `0` offset.

use std::fmt;
use std::io;

/// Result type for metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;

/// Errors produced while writing or reading a metadata container.
#[derive(Debug)]
pub enum MetaError {
    /// A heap position does not fit the configured pointer width.
    OffsetOverflow {
        /// The offset that was being written.
        offset: u64,
        /// Configured pointer width in bytes.
        pointer_size: u8,
    },
    /// A count (array length, inline element count, module index) does not
    /// fit its field.
    CountOverflow {
        /// The count that was being written.
        count: u64,
        /// Width of the field in bytes.
        width: u8,
    },
    /// A configured width is outside `1..=8`.
    InvalidWidth {
        /// Which width was rejected.
        name: &'static str,
        /// The rejected value.
        value: u8,
    },
    /// The declaration forest broke a precondition owned by its producer.
    InvariantViolation(String),
    /// A name referenced by a type encoding is not registered in the
    /// global table.
    UnresolvedDeclarationReference(String),
    /// Malformed or truncated container bytes.
    Decode {
        /// Absolute position where decoding failed.
        position: u64,
        /// What was wrong.
        reason: String,
    },
    /// Stream failure while saving.
    Io(io::Error),
}

impl MetaError {
    pub(crate) fn decode(position: u64, reason: impl Into<String>) -> Self {
        MetaError::Decode {
            position,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MetaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaError::OffsetOverflow {
                offset,
                pointer_size,
            } => write!(
                f,
                "offset {} does not fit in a {}-byte pointer",
                offset, pointer_size
            ),
            MetaError::CountOverflow { count, width } => {
                write!(f, "count {} does not fit in {} byte(s)", count, width)
            }
            MetaError::InvalidWidth { name, value } => {
                write!(f, "{} must be between 1 and 8, got {}", name, value)
            }
            MetaError::InvariantViolation(msg) => write!(f, "invariant violation: {}", msg),
            MetaError::UnresolvedDeclarationReference(name) => {
                write!(f, "unresolved declaration reference: {}", name)
            }
            MetaError::Decode { position, reason } => {
                write!(f, "malformed metadata at {}: {}", position, reason)
            }
            MetaError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for MetaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetaError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for MetaError {
    fn from(err: io::Error) -> Self {
        MetaError::Io(err)
    }
}
