//! Error types shared by the core codecs.

use thiserror::Error;

/// Errors produced while encoding or decoding fixed-layout records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input buffer has a different length than the record requires.
    #[error("unexpected length: got {got}, want {want}")]
    UnexpectedLength { got: usize, want: usize },

    /// A read ran past the end of the input buffer.
    #[error("unexpected end of input reading {0}")]
    UnexpectedEnd(&'static str),

    /// A length prefix claims more bytes than the buffer holds.
    #[error("length prefix for {what} exceeds buffer: {len} > {remaining}")]
    LengthExceedsBuffer {
        what: &'static str,
        len: usize,
        remaining: usize,
    },

    /// Bytes remain after the record was fully decoded.
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}
