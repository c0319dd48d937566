//! The 80-byte block header and its wire codec.
//!
//! Headers serialize little-endian at fixed offsets: version (0..4),
//! previous block hash (4..36), merkle root (36..68), timestamp (68..72),
//! bits (72..76), nonce (76..80). Hashes embedded in the wire format are in
//! internal byte order; the parsed struct holds them in display order so
//! they compare directly against computed block hashes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hashes::{sha256d, BlockHash, TxMerkleNode};
use crate::pow::{CompactTarget, Target};

/// A block header.
///
/// Contains all of a block's consensus metadata, including the root of the
/// merkle tree committing to the block's transactions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    /// Block version, now repurposed for soft fork signalling.
    pub version: i32,
    /// Reference to the previous block in the chain.
    pub prev_blockhash: BlockHash,
    /// The root hash of the merkle tree of transactions in the block.
    pub merkle_root: TxMerkleNode,
    /// The timestamp of the block, as claimed by the miner.
    pub timestamp: u32,
    /// The target value below which the blockhash must lie.
    pub bits: CompactTarget,
    /// The nonce, selected to obtain a low enough blockhash.
    pub nonce: u32,
}

fn read_u32_le(raw: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&raw[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_hash(raw: &[u8], offset: usize) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&raw[offset..offset + 32]);
    buf
}

impl Header {
    /// The number of bytes a serialized header occupies.
    pub const SIZE: usize = 80;

    /// Parses a raw 80-byte header.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() != Self::SIZE {
            return Err(Error::InvalidHeaderLength(raw.len()));
        }
        Ok(Header {
            version: read_u32_le(raw, 0) as i32,
            prev_blockhash: BlockHash::from_internal_byte_array(read_hash(raw, 4)),
            merkle_root: TxMerkleNode::from_internal_byte_array(read_hash(raw, 36)),
            timestamp: read_u32_le(raw, 68),
            bits: CompactTarget::new(read_u32_le(raw, 72)),
            nonce: read_u32_le(raw, 76),
        })
    }

    /// Serializes into the 80-byte wire format, the exact inverse of
    /// [`Header::parse`].
    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut raw = [0u8; Self::SIZE];
        raw[0..4].copy_from_slice(&self.version.to_le_bytes());
        raw[4..36].copy_from_slice(&self.prev_blockhash.to_internal_byte_array());
        raw[36..68].copy_from_slice(&self.merkle_root.to_internal_byte_array());
        raw[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        raw[72..76].copy_from_slice(&self.bits.to_consensus().to_le_bytes());
        raw[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        raw
    }

    /// Computes the block hash: double SHA-256 of the serialized header,
    /// reversed into display order.
    pub fn block_hash(&self) -> BlockHash {
        BlockHash::from_internal_byte_array(sha256d(&self.serialize()))
    }

    /// The difficulty target this header claims.
    pub fn target(&self) -> Result<Target> {
        Target::from_compact(self.bits)
    }
}
