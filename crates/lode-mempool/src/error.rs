//! Error types for fee estimation and fee rules.

use lode_core::CodecError;
use thiserror::Error;

/// Errors surfaced by the fee estimator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeeEstimatorError {
    /// Fewer blocks have been registered than the configured minimum.
    #[error("not enough blocks have been observed")]
    NotEnoughBlocks,

    /// Estimates cover confirmation targets 1 through 25 only.
    #[error("confirmation target {0} out of range")]
    DepthOutOfRange(u32),

    /// A registered block must directly extend the last known height.
    #[error("intermediate block not recorded: current height is {current}, new height is {new}")]
    IntermediateBlockNotRecorded { current: i32, new: i32 },

    /// A block claimed a transaction the estimator already saw mined.
    #[error("transaction {0} has already been mined")]
    AlreadyMined(String),

    /// The rollback target is not in the recently registered stack.
    #[error("no such block was recently registered")]
    UnknownBlock,

    /// The state blob was produced by a different serialization version.
    #[error("incorrect state version: expected {expected}, found {found}")]
    BadVersion { expected: u32, found: u32 },

    /// A bin referenced an observed-transaction index that does not exist.
    #[error("invalid transaction reference {0}")]
    InvalidTxReference(u32),

    /// The state blob is malformed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Transaction rule violations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulesError {
    #[error("transaction output amount is negative")]
    AmountNegative,

    #[error("transaction output amount exceeds maximum value")]
    AmountExceedsMax,

    #[error("transaction output is dust")]
    OutputIsDust,
}
