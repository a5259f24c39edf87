// SPDX-License-Identifier: MIT
//! Error taxonomy shared by the codec modules

/// Errors that can occur while encoding or decoding a binary Ion stream
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The bytes violate the wire format. Fatal to the current reader;
    /// the buffer cannot be trusted past the reported offset.
    #[error("malformed binary at offset {offset}: {reason}")]
    MalformedBinary { reason: &'static str, offset: usize },

    /// A variable-length integer exceeds the width of its target type.
    #[error("integer overflow: {0}")]
    Overflow(&'static str),

    /// An operation was invoked in a cursor or writer state where it is
    /// not defined. This is a caller bug, not a data error.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A symbol table mutation or import was rejected. The table keeps
    /// its prior state.
    #[error("symbol table error: {0}")]
    SymbolTable(String),

    /// The writer's predicted and emitted byte counts disagree. This is
    /// a defect in the patch bookkeeping itself; no stream is emitted.
    #[error("internal consistency failure: {0}")]
    InternalConsistency(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed(reason: &'static str, offset: usize) -> Self {
        Error::MalformedBinary { reason, offset }
    }
}
