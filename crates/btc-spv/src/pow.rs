//! Difficulty targets and chain work.
//!
//! A `Target` is the 256-bit value a valid block hash must not exceed; the
//! lower the target, the higher the difficulty. `CompactTarget` is the
//! 32-bit floating-point encoding of a target carried in block headers (the
//! `bits` field). `Work` is the expected number of hash attempts a target
//! represents, and `ChainWork` accumulates work relative to the anchor
//! block, going negative for blocks accepted below it.

use std::cmp::Ordering;
use std::fmt;

use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hashes::BlockHash;

/// Compact representation of a [`Target`], as carried in block headers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompactTarget(u32);

impl CompactTarget {
    /// Wraps a consensus `bits` value.
    pub const fn new(bits: u32) -> Self {
        CompactTarget(bits)
    }

    /// The raw consensus `bits` value.
    pub const fn to_consensus(self) -> u32 {
        self.0
    }

    /// The per-block work these bits represent.
    pub fn work(self) -> Result<Work> {
        Ok(Target::from_compact(self)?.to_work())
    }
}

impl fmt::Display for CompactTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A difficulty target expressed as an unsigned 256-bit integer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target(U256);

impl Target {
    pub(crate) const fn from_limbs(limbs: [u64; 4]) -> Self {
        Target(U256(limbs))
    }

    /// Creates a `Target` from a hexadecimal string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        U256::from_str_radix(hex, 16).ok().map(Target)
    }

    /// The all-zero target.
    pub const fn zero() -> Self {
        Target(U256([0, 0, 0, 0]))
    }

    /// Decodes a compact target.
    ///
    /// The compact format stores a 3-byte mantissa and a 1-byte base-256
    /// exponent; the target is `mantissa * 256^(exponent - 3)`. A set sign
    /// bit with a nonzero mantissa is rejected as negative, and encodings
    /// whose value cannot fit 256 bits are rejected as overflow, matching
    /// the upstream `SetCompact` rules.
    pub fn from_compact(compact: CompactTarget) -> Result<Self> {
        let bits = compact.to_consensus();
        let size = bits >> 24;
        let word = bits & 0x007f_ffff;

        if word != 0 && bits & 0x0080_0000 != 0 {
            return Err(Error::BitsNegative);
        }
        if word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32)) {
            return Err(Error::BitsOverflow);
        }

        let target = if size <= 3 {
            U256::from(word >> (8 * (3 - size)))
        } else {
            U256::from(word) << (8 * (size - 3))
        };
        Ok(Target(target))
    }

    /// Encodes this target in compact form.
    ///
    /// The exponent is the byte length of the target; if the top mantissa
    /// byte would carry the sign bit, the mantissa is shifted right one byte
    /// and the exponent incremented.
    pub fn to_compact(self) -> CompactTarget {
        let mut size = (self.0.bits() + 7) / 8;
        let mut compact = if size <= 3 {
            (self.0.low_u64() << (8 * (3 - size))) as u32
        } else {
            ((self.0 >> (8 * (size - 3))).low_u64() & 0x00ff_ffff) as u32
        };
        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }
        CompactTarget(compact | ((size as u32) << 24))
    }

    /// The expected number of hash attempts to find a block at this target:
    /// `(~target / (target + 1)) + 1` in unsigned 256-bit arithmetic.
    ///
    /// A zero target yields zero work (the upstream `GetBlockProof` guard);
    /// the all-ones target yields work 1.
    pub fn to_work(self) -> Work {
        if self.0.is_zero() {
            return Work(U256::zero());
        }
        if self.0 == U256::MAX {
            return Work(U256::one());
        }
        Work((!self.0 / (self.0 + U256::one())) + U256::one())
    }

    /// True when `hash`, read as a 256-bit integer, does not exceed this
    /// target.
    pub fn is_met_by(&self, hash: &BlockHash) -> bool {
        U256::from_big_endian(hash.as_byte_array()) <= self.0
    }

    /// Scales this target by `numerator / denominator` through a 512-bit
    /// intermediate, saturating at `cap`.
    pub fn scale_clamped(self, numerator: u32, denominator: u32, cap: Target) -> Target {
        let scaled = self.0.full_mul(U256::from(numerator)) / U512::from(denominator);
        match U256::try_from(scaled) {
            Ok(value) if value <= cap.0 => Target(value),
            _ => cap,
        }
    }
}

/// Per-block work: the expected number of hash attempts a target represents.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Work(U256);

impl Work {
    /// True for zero work.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

/// Cumulative work relative to the anchor block.
///
/// Two's-complement signed 256-bit: blocks accepted below the anchor carry
/// negative values, so ordering compares the sign bit before the magnitude.
/// Addition and subtraction wrap, mirroring the fixed-width ledger cell the
/// value is defined over.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainWork(U256);

impl ChainWork {
    /// Zero cumulative work.
    pub const ZERO: Self = ChainWork(U256([0, 0, 0, 0]));

    /// The cumulative work of a chain consisting of one block of `work`.
    pub fn from_work(work: Work) -> Self {
        ChainWork(work.0)
    }

    /// Adds one block's work.
    pub fn add(self, work: Work) -> Self {
        ChainWork(self.0.overflowing_add(work.0).0)
    }

    /// Removes one block's work.
    pub fn sub(self, work: Work) -> Self {
        ChainWork(self.0.overflowing_sub(work.0).0)
    }

    /// True when the value is negative in two's complement.
    pub fn is_negative(&self) -> bool {
        self.0.bit(255)
    }
}

impl Ord for ChainWork {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_negative(), other.is_negative()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for ChainWork {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ChainWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            let magnitude = (!self.0).overflowing_add(U256::one()).0;
            write!(f, "ChainWork(-{:#x})", magnitude)
        } else {
            write!(f, "ChainWork({:#x})", self.0)
        }
    }
}
