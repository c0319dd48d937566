//! Header records and the chain store.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::blockdata::Header;
use crate::error::{Error, Result};
use crate::hashes::BlockHash;
use crate::pow::ChainWork;

/// A block header together with the chain metadata tracked for it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHeader {
    /// The parsed header.
    pub header: Header,
    /// Height of this block.
    pub height: u64,
    /// Cumulative work from the anchor up to and including this block.
    pub chain_work: ChainWork,
    /// Whether this header lies on the current best-work chain.
    pub is_canonical: bool,
}

/// Store of every observed header plus the canonical-chain indexes.
///
/// The header key set is append-only; after insertion only a record's
/// `is_canonical` flag ever changes. The height index covers the canonical
/// chain alone, with [`BlockHash::ZERO`] marking heights whose canonical
/// entry was cleared by a shortening reorg.
#[derive(Clone, Debug)]
pub struct HeaderStore {
    headers: HashMap<BlockHash, StoredHeader>,
    height_index: HashMap<u64, BlockHash>,
    latest: BlockHash,
    first: BlockHash,
}

impl HeaderStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            headers: HashMap::new(),
            height_index: HashMap::new(),
            latest: BlockHash::ZERO,
            first: BlockHash::ZERO,
        }
    }

    pub(crate) fn from_parts(
        headers: HashMap<BlockHash, StoredHeader>,
        height_index: HashMap<u64, BlockHash>,
        latest: BlockHash,
        first: BlockHash,
    ) -> Self {
        Self {
            headers,
            height_index,
            latest,
            first,
        }
    }

    /// Number of stored headers, canonical or not.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// True when no header has been stored.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// True when a record exists for `hash`.
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.headers.contains_key(hash)
    }

    /// Looks up a header record.
    pub fn get(&self, hash: &BlockHash) -> Option<&StoredHeader> {
        self.headers.get(hash)
    }

    /// Looks up a header record, failing when it is absent.
    pub fn require(&self, hash: &BlockHash) -> Result<&StoredHeader> {
        self.headers.get(hash).ok_or(Error::BlockNotFound)
    }

    /// Inserts a new record; a duplicate hash is rejected.
    pub fn insert(&mut self, hash: BlockHash, record: StoredHeader) -> Result<()> {
        match self.headers.entry(hash) {
            Entry::Occupied(_) => Err(Error::HeaderAlreadyExists(hash)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    /// Flips the canonical flag of an existing record.
    pub fn set_canonical(&mut self, hash: &BlockHash, canonical: bool) -> Result<()> {
        let record = self.headers.get_mut(hash).ok_or(Error::BlockNotFound)?;
        record.is_canonical = canonical;
        Ok(())
    }

    /// The canonical block hash at `height`, if one is recorded.
    pub fn hash_at(&self, height: u64) -> Option<BlockHash> {
        self.height_index
            .get(&height)
            .copied()
            .filter(|hash| !hash.is_zero())
    }

    /// Records `hash` as the canonical block at `height`.
    pub fn index_height(&mut self, height: u64, hash: BlockHash) {
        self.height_index.insert(height, hash);
    }

    /// Clears the canonical entry at `height` back to the zero hash.
    pub fn clear_height(&mut self, height: u64) {
        self.height_index.insert(height, BlockHash::ZERO);
    }

    /// The canonical tip.
    pub fn latest(&self) -> BlockHash {
        self.latest
    }

    pub(crate) fn set_latest(&mut self, hash: BlockHash) {
        self.latest = hash;
    }

    /// The earliest known canonical block.
    pub fn first(&self) -> BlockHash {
        self.first
    }

    pub(crate) fn set_first(&mut self, hash: BlockHash) {
        self.first = hash;
    }

    /// Iterates every stored record.
    pub fn iter(&self) -> impl Iterator<Item = (&BlockHash, &StoredHeader)> {
        self.headers.iter()
    }

    /// Iterates the height index, including cleared sentinel entries.
    pub fn iter_height_index(&self) -> impl Iterator<Item = (u64, BlockHash)> + '_ {
        self.height_index.iter().map(|(height, hash)| (*height, *hash))
    }
}

impl Default for HeaderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::hashes::TxMerkleNode;
    use crate::pow::CompactTarget;

    use super::*;

    fn record(height: u64) -> StoredHeader {
        StoredHeader {
            header: Header {
                version: 2,
                prev_blockhash: BlockHash::from_byte_array([1; 32]),
                merkle_root: TxMerkleNode::from_byte_array([2; 32]),
                timestamp: 1_231_006_505,
                bits: CompactTarget::new(0x1d00ffff),
                nonce: 7,
            },
            height,
            chain_work: crate::pow::ChainWork::ZERO,
            is_canonical: true,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut store = HeaderStore::new();
        assert!(store.is_empty());

        let hash = BlockHash::from_byte_array([9; 32]);
        store.insert(hash, record(100)).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains(&hash));
        assert_eq!(store.get(&hash).unwrap().height, 100);
        assert_eq!(store.require(&hash).unwrap().height, 100);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut store = HeaderStore::new();
        let hash = BlockHash::from_byte_array([9; 32]);
        store.insert(hash, record(100)).unwrap();
        assert_eq!(
            store.insert(hash, record(101)),
            Err(Error::HeaderAlreadyExists(hash))
        );
        // The original record is untouched.
        assert_eq!(store.get(&hash).unwrap().height, 100);
    }

    #[test]
    fn test_require_missing() {
        let store = HeaderStore::new();
        let hash = BlockHash::from_byte_array([9; 32]);
        assert_eq!(store.require(&hash), Err(Error::BlockNotFound));
    }

    #[test]
    fn test_height_index_zero_sentinel() {
        let mut store = HeaderStore::new();
        let hash = BlockHash::from_byte_array([9; 32]);

        assert_eq!(store.hash_at(100), None);
        store.index_height(100, hash);
        assert_eq!(store.hash_at(100), Some(hash));

        store.clear_height(100);
        assert_eq!(store.hash_at(100), None);
        // The sentinel entry itself survives for persistence.
        assert!(store
            .iter_height_index()
            .any(|(height, hash)| height == 100 && hash.is_zero()));
    }

    #[test]
    fn test_set_canonical() {
        let mut store = HeaderStore::new();
        let hash = BlockHash::from_byte_array([9; 32]);
        store.insert(hash, record(100)).unwrap();

        store.set_canonical(&hash, false).unwrap();
        assert!(!store.get(&hash).unwrap().is_canonical);

        let missing = BlockHash::from_byte_array([8; 32]);
        assert_eq!(store.set_canonical(&missing, true), Err(Error::BlockNotFound));
    }
}
