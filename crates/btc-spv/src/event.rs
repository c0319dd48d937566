//! Events emitted by the oracle.

use std::fmt;

use crate::blockdata::Header;
use crate::hashes::BlockHash;

/// Emitted exactly once for every accepted header, including the anchor at
/// initialization and backward extensions of the first block.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct NewBlockHeader {
    /// Hash of the accepted block, in display order.
    pub block_hash: BlockHash,
    /// Height assigned to the block.
    pub height: u64,
    /// The raw 80-byte header.
    pub raw_header: [u8; Header::SIZE],
    /// True when this submission moved the canonical tip.
    pub latest_updated: bool,
}

impl fmt::Debug for NewBlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewBlockHeader")
            .field("block_hash", &self.block_hash)
            .field("height", &self.height)
            .field("raw_header", &hex::encode(self.raw_header))
            .field("latest_updated", &self.latest_updated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_renders_raw_as_hex() {
        let event = NewBlockHeader {
            block_hash: BlockHash::from_byte_array([0xaa; 32]),
            height: 2_016_000,
            raw_header: [0x01; Header::SIZE],
            latest_updated: true,
        };
        let rendered = format!("{event:?}");
        assert!(rendered.contains(&"01".repeat(Header::SIZE)));
        assert!(rendered.contains("2016000"));
    }
}
