use thiserror::Error;

use crate::data::VersionContext;

#[derive(Error, Debug)]
pub enum DecodeError {
    /// No row of a record's rule table accepts the version context, or the matching row is
    /// a known-undecodable combination.
    #[error("Unsupported {record} layout for {context}: {reason}")]
    UnsupportedLayout {
        record: &'static str,
        context: VersionContext,
        reason: String,
    },
    /// Declared counts disagree with the bytes that are left, or a required sub-structure is
    /// missing.
    #[error("Malformed stream at 0x{offset:X}: {detail}")]
    MalformedStream { offset: usize, detail: String },
    #[error("Unknown compression scheme: {scheme}")]
    UnknownCompressionScheme { scheme: String },
}

impl DecodeError {
    pub fn malformed(offset: usize, detail: impl Into<String>) -> Self {
        DecodeError::MalformedStream {
            offset,
            detail: detail.into(),
        }
    }

    pub fn unsupported(
        record: &'static str,
        context: &VersionContext,
        reason: impl Into<String>,
    ) -> Self {
        DecodeError::UnsupportedLayout {
            record,
            context: *context,
            reason: reason.into(),
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Converts a winnow failure that happened at `offset` into a stream error.
pub fn parse_failure(
    offset: usize,
    e: winnow::error::ErrMode<winnow::error::ContextError>,
) -> DecodeError {
    DecodeError::MalformedStream {
        offset,
        detail: format!("{e}"),
    }
}
