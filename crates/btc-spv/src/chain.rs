//! The header-chain engine: submission, retargeting, reorgs, finality, and
//! the metadata query surface.

use tracing::{debug, info, warn};

use crate::blockdata::Header;
use crate::consensus::Params;
use crate::error::{Error, Result};
use crate::event::NewBlockHeader;
use crate::hashes::{BlockHash, TxMerkleNode};
use crate::pow::{ChainWork, CompactTarget, Target};
use crate::store::{HeaderStore, StoredHeader};

/// The SPV header-chain oracle.
///
/// A deterministic state machine over a [`HeaderStore`]: it ingests raw
/// 80-byte headers, validates them against consensus rules, tracks forks
/// with lazy canonicalization, and answers metadata and inclusion-proof
/// queries over the canonical (most-work) chain.
///
/// The oracle is anchored at a header supplied at construction whose height
/// must sit on a retargeting boundary, so that future retargets find a
/// legitimate period-start block. All submissions are serialized by the
/// caller; there is no interior mutability.
#[derive(Clone, Debug)]
pub struct HeaderOracle {
    store: HeaderStore,
    params: Params,
    init_height: u64,
    check_pow: bool,
}

impl HeaderOracle {
    /// Anchors a new oracle at `raw_header` with height `init_height`.
    ///
    /// `init_height` must be a multiple of the retargeting interval.
    /// `check_pow` is immutable for the life of the oracle and must be true
    /// in production deployments. Returns the oracle together with the
    /// event for the anchor, which always carries `latest_updated = true`.
    pub fn initialize(
        params: Params,
        init_height: u64,
        raw_header: &[u8],
        check_pow: bool,
    ) -> Result<(Self, NewBlockHeader)> {
        if init_height % params.difficulty_adjustment_interval != 0 {
            return Err(Error::InitNotAtRetargetBoundary(init_height));
        }
        let header = Header::parse(raw_header)?;
        let hash = header.block_hash();
        let work = header.target()?.to_work();

        let mut store = HeaderStore::new();
        store.insert(
            hash,
            StoredHeader {
                header,
                height: init_height,
                chain_work: ChainWork::from_work(work),
                is_canonical: true,
            },
        )?;
        store.index_height(init_height, hash);
        store.set_latest(hash);
        store.set_first(hash);
        info!(%hash, height = init_height, check_pow, "anchored header oracle");

        let event = NewBlockHeader {
            block_hash: hash,
            height: init_height,
            raw_header: header.serialize(),
            latest_updated: true,
        };
        Ok((
            Self {
                store,
                params,
                init_height,
                check_pow,
            },
            event,
        ))
    }

    pub(crate) fn from_parts(
        store: HeaderStore,
        params: Params,
        init_height: u64,
        check_pow: bool,
    ) -> Self {
        Self {
            store,
            params,
            init_height,
            check_pow,
        }
    }

    /// Submits one raw 80-byte header.
    ///
    /// The full acceptance pipeline: parse, duplicate rejection, parent
    /// resolution (including the backward extension of the first block),
    /// proof-of-work and retarget validation when enabled, work
    /// accumulation, and tip selection with reorg handling. Exactly one
    /// event is returned for an accepted header.
    pub fn submit(&mut self, raw_header: &[u8]) -> Result<NewBlockHeader> {
        let header = Header::parse(raw_header)?;
        let hash = header.block_hash();
        if self.store.contains(&hash) {
            return Err(Error::HeaderAlreadyExists(hash));
        }

        let prev = match self.store.get(&header.prev_blockhash).copied() {
            Some(prev) => prev,
            None => {
                // The block may be the parent of the earliest known block,
                // extending the chain backward by exactly one.
                let first_hash = self.store.first();
                let first = *self.store.require(&first_hash)?;
                if first.header.prev_blockhash == hash {
                    if let Some(new_height) = first.height.checked_sub(1) {
                        return self.extend_backward(header, hash, first, new_height);
                    }
                }
                return Err(Error::PrevBlockNotFound(header.prev_blockhash));
            }
        };

        let new_height = prev.height + 1;
        if new_height <= self.init_height {
            return Err(Error::ForkBelowAnchor {
                height: new_height,
                anchor: self.init_height,
            });
        }

        let target = header.target()?;
        if self.check_pow {
            let expected = self.next_block_bits(&prev, new_height)?;
            if header.bits != expected {
                return Err(Error::InvalidBits {
                    expected,
                    got: header.bits,
                });
            }
            if !target.is_met_by(&hash) {
                return Err(Error::InvalidPow(hash));
            }
        }

        let new_work = prev.chain_work.add(target.to_work());
        self.store.insert(
            hash,
            StoredHeader {
                header,
                height: new_height,
                chain_work: new_work,
                is_canonical: true,
            },
        )?;

        let tip_hash = self.store.latest();
        let latest_updated = if header.prev_blockhash == tip_hash {
            self.store.index_height(new_height, hash);
            self.store.set_latest(hash);
            debug!(%hash, height = new_height, "extended canonical tip");
            true
        } else {
            let tip = *self.store.require(&tip_hash)?;
            if new_work > tip.chain_work {
                self.reorg_to(hash, &header, new_height)?;
                true
            } else {
                // Equal work keeps the incumbent tip.
                self.store.set_canonical(&hash, false)?;
                debug!(%hash, height = new_height, "stored sidechain header");
                false
            }
        };

        Ok(NewBlockHeader {
            block_hash: hash,
            height: new_height,
            raw_header: header.serialize(),
            latest_updated,
        })
    }

    /// Submits a sequence of raw headers, all-or-nothing.
    ///
    /// Sequentially equivalent to [`HeaderOracle::submit`] per element; on
    /// the first rejection the store is restored to its pre-batch state and
    /// the error returned, so no partial batch is ever observable.
    pub fn batch_submit<B: AsRef<[u8]>>(&mut self, raw_headers: &[B]) -> Result<Vec<NewBlockHeader>> {
        let checkpoint = self.store.clone();
        let mut events = Vec::with_capacity(raw_headers.len());
        for raw_header in raw_headers {
            match self.submit(raw_header.as_ref()) {
                Ok(event) => events.push(event),
                Err(err) => {
                    self.store = checkpoint;
                    return Err(err);
                }
            }
        }
        Ok(events)
    }

    /// Stores a block below the current first block and moves the first
    /// pointer onto it.
    ///
    /// The cumulative work at a height is the sum from that height upward to
    /// and including the first block, so the new record subtracts the work
    /// of the block that used to be first; values below the anchor go
    /// negative. The tip never changes on this path.
    fn extend_backward(
        &mut self,
        header: Header,
        hash: BlockHash,
        first: StoredHeader,
        new_height: u64,
    ) -> Result<NewBlockHeader> {
        let chain_work = first.chain_work.sub(first.header.target()?.to_work());
        self.store.insert(
            hash,
            StoredHeader {
                header,
                height: new_height,
                chain_work,
                is_canonical: true,
            },
        )?;
        self.store.set_first(hash);
        self.store.index_height(new_height, hash);
        info!(%hash, height = new_height, "extended chain backward");

        Ok(NewBlockHeader {
            block_hash: hash,
            height: new_height,
            raw_header: header.serialize(),
            latest_updated: false,
        })
    }

    /// Adopts the strictly-greater-work branch ending at the already-stored
    /// block `new_hash` at `new_height`.
    fn reorg_to(&mut self, new_hash: BlockHash, new_header: &Header, new_height: u64) -> Result<()> {
        // Walk the new branch toward the anchor until the first header that
        // is already canonical: the common ancestor. Everything visited
        // becomes canonical and owns its height slot.
        let mut cursor = new_header.prev_blockhash;
        loop {
            let record = *self.store.require(&cursor)?;
            if record.is_canonical {
                break;
            }
            self.store.set_canonical(&cursor, true)?;
            self.store.index_height(record.height, cursor);
            cursor = record.header.prev_blockhash;
        }
        let ancestor = cursor;

        // Retire the old branch down to the common ancestor. Heights above
        // the new tip no longer have a canonical block at all and are
        // cleared to the zero hash.
        let mut cursor = self.store.latest();
        let mut retired = 0u64;
        while cursor != ancestor {
            let record = *self.store.require(&cursor)?;
            self.store.set_canonical(&cursor, false)?;
            if record.height > new_height {
                self.store.clear_height(record.height);
            }
            retired += 1;
            cursor = record.header.prev_blockhash;
        }

        self.store.index_height(new_height, new_hash);
        self.store.set_latest(new_hash);
        info!(%new_hash, height = new_height, retired, %ancestor, "reorganized to greater-work branch");
        Ok(())
    }

    /// The `bits` required of a block at `new_height` whose parent is `prev`.
    ///
    /// Away from retargeting boundaries this is the parent's bits. At a
    /// boundary, the closing period's timespan is measured against the
    /// canonical chain, clamped to a factor of four either way, and applied
    /// to the parent's target, capped at the proof-of-work limit.
    ///
    /// The period-start lookup goes through the canonical height index, so
    /// a fork retargeting against a different 2016-block history is not
    /// supported; cumulative work still decides the best chain.
    pub fn next_block_bits(&self, prev: &StoredHeader, new_height: u64) -> Result<CompactTarget> {
        if new_height % self.params.difficulty_adjustment_interval != 0 {
            return Ok(prev.header.bits);
        }

        let period_first_height = new_height - self.params.difficulty_adjustment_interval;
        let period_first_hash = self
            .store
            .hash_at(period_first_height)
            .ok_or(Error::BlockNotFound)?;
        let period_start = self.store.require(&period_first_hash)?.header.timestamp;

        // Unsigned subtraction: a period start ahead of the parent's
        // timestamp wraps, and the clamp then forces maximum expansion.
        if period_start > prev.header.timestamp {
            warn!(
                period_start,
                parent_timestamp = prev.header.timestamp,
                "retarget timespan wrapped"
            );
        }
        let timespan = prev
            .header
            .timestamp
            .wrapping_sub(period_start)
            .clamp(self.params.pow_target_timespan / 4, self.params.pow_target_timespan * 4);

        let new_target = Target::from_compact(prev.header.bits)?.scale_clamped(
            timespan,
            self.params.pow_target_timespan,
            self.params.pow_limit,
        );
        Ok(new_target.to_compact())
    }

    /// The canonical tip.
    pub fn latest_block_hash(&self) -> BlockHash {
        self.store.latest()
    }

    /// The earliest known canonical block.
    pub fn first_block_hash(&self) -> BlockHash {
        self.store.first()
    }

    /// Height of the canonical tip.
    pub fn latest_height(&self) -> Result<u64> {
        let latest = self.store.latest();
        Ok(self.store.require(&latest)?.height)
    }

    /// The anchor height supplied at construction.
    pub fn init_block_height(&self) -> u64 {
        self.init_height
    }

    /// Whether proof-of-work checking is enabled.
    pub fn check_pow(&self) -> bool {
        self.check_pow
    }

    /// The consensus parameters in force.
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub(crate) fn store(&self) -> &HeaderStore {
        &self.store
    }

    /// Resolves the canonical block hash at `height`.
    ///
    /// This is the only supported way to resolve heights: unsafe lookups of
    /// recent heights may flip under reorg, which is exactly what
    /// `require_safe` guards against.
    pub fn block_hash_by_height(&self, height: u64, require_safe: bool) -> Result<BlockHash> {
        let hash = self.store.hash_at(height).ok_or(Error::BlockNotFound)?;
        if require_safe {
            self.queryable(&hash, true)?;
        }
        Ok(hash)
    }

    /// The full stored record for `hash`.
    pub fn header_by_hash(&self, hash: &BlockHash, require_safe: bool) -> Result<StoredHeader> {
        Ok(*self.queryable(hash, require_safe)?)
    }

    /// The full stored record at `height`.
    pub fn header_by_height(&self, height: u64, require_safe: bool) -> Result<StoredHeader> {
        let hash = self.block_hash_by_height(height, require_safe)?;
        Ok(*self.store.require(&hash)?)
    }

    /// The serialized 80-byte header for `hash`.
    pub fn raw_header_by_hash(
        &self,
        hash: &BlockHash,
        require_safe: bool,
    ) -> Result<[u8; Header::SIZE]> {
        Ok(self.queryable(hash, require_safe)?.header.serialize())
    }

    /// The serialized 80-byte header at `height`.
    pub fn raw_header_by_height(
        &self,
        height: u64,
        require_safe: bool,
    ) -> Result<[u8; Header::SIZE]> {
        Ok(self.header_by_height(height, require_safe)?.header.serialize())
    }

    /// The merkle root committed by the block `hash`.
    pub fn merkle_root_by_hash(&self, hash: &BlockHash, require_safe: bool) -> Result<TxMerkleNode> {
        Ok(self.queryable(hash, require_safe)?.header.merkle_root)
    }

    /// The timestamp of the block `hash`.
    pub fn timestamp_by_hash(&self, hash: &BlockHash, require_safe: bool) -> Result<u32> {
        Ok(self.queryable(hash, require_safe)?.header.timestamp)
    }

    /// The difficulty bits of the block `hash`.
    pub fn bits_by_hash(&self, hash: &BlockHash, require_safe: bool) -> Result<CompactTarget> {
        Ok(self.queryable(hash, require_safe)?.header.bits)
    }

    /// The height of the block `hash`.
    pub fn height_by_hash(&self, hash: &BlockHash, require_safe: bool) -> Result<u64> {
        Ok(self.queryable(hash, require_safe)?.height)
    }

    /// The cumulative work of the block `hash`, relative to the anchor.
    pub fn chain_work_by_hash(&self, hash: &BlockHash, require_safe: bool) -> Result<ChainWork> {
        Ok(self.queryable(hash, require_safe)?.chain_work)
    }

    /// True when the block is canonical and buried by at least the
    /// configured number of confirmations, counting itself.
    pub fn is_finalized_by_hash(&self, hash: &BlockHash) -> Result<bool> {
        let record = self.store.require(hash)?;
        Ok(record.is_canonical
            && self.confirmations(record.height)? >= self.params.min_confirmations)
    }

    /// True when the canonical block at `height` is finalized.
    pub fn is_finalized_by_height(&self, height: u64) -> Result<bool> {
        let hash = self.store.hash_at(height).ok_or(Error::BlockNotFound)?;
        self.is_finalized_by_hash(&hash)
    }

    /// Shared gate for the by-hash accessors: the record must exist, and
    /// with `require_safe` must also be canonical and finalized.
    pub(crate) fn queryable(&self, hash: &BlockHash, require_safe: bool) -> Result<&StoredHeader> {
        let record = self.store.require(hash)?;
        if require_safe {
            if !record.is_canonical {
                return Err(Error::NotCanonical(*hash));
            }
            let confirmations = self.confirmations(record.height)?;
            if confirmations < self.params.min_confirmations {
                return Err(Error::InsufficientConfirmations {
                    got: confirmations,
                    need: self.params.min_confirmations,
                });
            }
        }
        Ok(record)
    }

    fn confirmations(&self, height: u64) -> Result<u64> {
        Ok(self.latest_height()?.saturating_sub(height) + 1)
    }
}
