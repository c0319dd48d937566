//! Error types for the oracle.

use thiserror::Error;

use crate::hashes::BlockHash;
use crate::pow::CompactTarget;

/// Result type for oracle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by header submission, queries, and proof validation.
///
/// Every error fails the current operation atomically. Proof-content
/// mismatches (wrong sibling, truncated branch, root mismatch) are reported
/// as `Ok(false)` from validation instead, so callers can tell an invalid
/// proof from a block that is not queryable at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A submitted header was not exactly 80 bytes.
    #[error("invalid header length: expected 80 bytes, got {0}")]
    InvalidHeaderLength(usize),

    /// The computed block hash is already stored.
    #[error("header already stored: {0}")]
    HeaderAlreadyExists(BlockHash),

    /// The referenced parent is unknown and the submission is not a backward
    /// extension of the first block.
    #[error("previous block not found: {0}")]
    PrevBlockNotFound(BlockHash),

    /// The submission would land at or below the anchor height.
    #[error("fork below anchor: height {height} is not above {anchor}")]
    ForkBelowAnchor {
        /// Height the submitted block would occupy.
        height: u64,
        /// Height of the anchor block.
        anchor: u64,
    },

    /// The submitted difficulty bits disagree with the retargeting rule.
    #[error("invalid bits: expected {expected}, got {got}")]
    InvalidBits {
        /// Bits required by the retargeting rule.
        expected: CompactTarget,
        /// Bits carried by the submitted header.
        got: CompactTarget,
    },

    /// The block hash does not meet the claimed target.
    #[error("proof of work is invalid for block {0}")]
    InvalidPow(BlockHash),

    /// The compact target encodes a negative value.
    #[error("compact target bits are negative")]
    BitsNegative,

    /// The compact target overflows 256 bits.
    #[error("compact target bits overflow")]
    BitsOverflow,

    /// No stored (canonical, where required) block matches the query.
    #[error("block not found")]
    BlockNotFound,

    /// The block exists but is not on the canonical chain.
    #[error("block {0} is not canonical")]
    NotCanonical(BlockHash),

    /// The block is canonical but too close to the tip to be final.
    #[error("insufficient confirmations: got {got}, need {need}")]
    InsufficientConfirmations {
        /// Confirmations the block has, counting itself.
        got: u64,
        /// Confirmations required for finality.
        need: u64,
    },

    /// Proof validation was called with malformed inputs.
    #[error("bad proof input: {0}")]
    BadProofInput(&'static str),

    /// The initialization height is not a multiple of the retargeting
    /// interval.
    #[error("init height {0} is not at a retarget boundary")]
    InitNotAtRetargetBoundary(u64),
}
