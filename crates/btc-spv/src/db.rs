//! redb-backed persistence for oracle snapshots.
//!
//! The oracle itself is an in-memory deterministic state machine; this
//! module saves and restores its full state through a redb key-value
//! database: one record per header, the canonical height index (cleared
//! entries included, as zero-hash sentinels), and a chain-state document
//! holding the pointers and construction parameters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::chain::HeaderOracle;
use crate::consensus::Params;
use crate::hashes::BlockHash;
use crate::store::{HeaderStore, StoredHeader};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Error from the underlying redb database engine.
    #[error("database error: {0}")]
    Redb(#[from] redb::DatabaseError),

    /// Error during database transaction operations.
    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Error when committing a transaction to the database.
    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error related to storage operations.
    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    /// Error when accessing or manipulating database tables.
    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    /// Error encoding or decoding a stored record.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The stored state does not satisfy the oracle's invariants.
    #[error("invalid database state: {0}")]
    Corrupt(String),
}

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

const HEADERS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("headers");
const HEIGHT_INDEX_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("height_index");
const CHAIN_STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("chain_state");

/// Pointer and construction state, stored as a single JSON document.
#[derive(Debug, Serialize, Deserialize)]
struct ChainStateDoc {
    latest: BlockHash,
    first: BlockHash,
    init_height: u64,
    check_pow: bool,
}

/// Database wrapper persisting oracle snapshots.
#[derive(Debug)]
pub struct OracleDatabase {
    db: Database,
    path: PathBuf,
}

impl OracleDatabase {
    /// Opens or creates a database at `path`, pre-creating all tables.
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path)?;

        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(HEADERS_TABLE)?;
            write_txn.open_table(HEIGHT_INDEX_TABLE)?;
            write_txn.open_table(CHAIN_STATE_TABLE)?;
        }
        write_txn.commit()?;

        info!(path = %path.display(), "opened oracle database");
        Ok(Self { db, path })
    }

    /// The on-disk path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists a full snapshot of the oracle in one transaction.
    ///
    /// Header records are keyed by display-order hash bytes. The header key
    /// set only ever grows for a given chain, so snapshots of the same
    /// oracle lineage overwrite each other consistently.
    pub fn save(&self, oracle: &HeaderOracle) -> DatabaseResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut headers = write_txn.open_table(HEADERS_TABLE)?;
            for (hash, record) in oracle.store().iter() {
                let value = serde_json::to_vec(record)?;
                headers.insert(&hash.to_byte_array()[..], &value[..])?;
            }

            let mut height_index = write_txn.open_table(HEIGHT_INDEX_TABLE)?;
            for (height, hash) in oracle.store().iter_height_index() {
                height_index.insert(height, &hash.to_byte_array()[..])?;
            }

            let mut chain_state = write_txn.open_table(CHAIN_STATE_TABLE)?;
            let doc = ChainStateDoc {
                latest: oracle.latest_block_hash(),
                first: oracle.first_block_hash(),
                init_height: oracle.init_block_height(),
                check_pow: oracle.check_pow(),
            };
            chain_state.insert("current", &serde_json::to_vec(&doc)?[..])?;
        }
        write_txn.commit()?;

        debug!(headers = oracle.store().len(), "persisted oracle snapshot");
        Ok(())
    }

    /// Loads the last saved snapshot, or `None` from a fresh database.
    ///
    /// `params` are code constants and are supplied by the caller rather
    /// than persisted.
    pub fn load(&self, params: Params) -> DatabaseResult<Option<HeaderOracle>> {
        let read_txn = self.db.begin_read()?;

        let chain_state = read_txn.open_table(CHAIN_STATE_TABLE)?;
        let Some(doc_bytes) = chain_state.get("current")? else {
            return Ok(None);
        };
        let doc: ChainStateDoc = serde_json::from_slice(doc_bytes.value())?;

        let headers_table = read_txn.open_table(HEADERS_TABLE)?;
        let mut headers = HashMap::new();
        for entry in headers_table.iter()? {
            let (key, value) = entry?;
            let hash = BlockHash::from_byte_array(read_hash_key(key.value())?);
            let record: StoredHeader = serde_json::from_slice(value.value())?;
            headers.insert(hash, record);
        }

        if !headers.contains_key(&doc.latest) {
            return Err(DatabaseError::Corrupt("latest block is not stored".into()));
        }
        if !headers.contains_key(&doc.first) {
            return Err(DatabaseError::Corrupt("first block is not stored".into()));
        }

        let height_table = read_txn.open_table(HEIGHT_INDEX_TABLE)?;
        let mut height_index = HashMap::new();
        for entry in height_table.iter()? {
            let (height, hash_bytes) = entry?;
            let hash = BlockHash::from_byte_array(read_hash_key(hash_bytes.value())?);
            height_index.insert(height.value(), hash);
        }

        let store = HeaderStore::from_parts(headers, height_index, doc.latest, doc.first);
        let oracle = HeaderOracle::from_parts(store, params, doc.init_height, doc.check_pow);
        info!(headers = oracle.store().len(), "loaded oracle snapshot");
        Ok(Some(oracle))
    }
}

fn read_hash_key(bytes: &[u8]) -> DatabaseResult<[u8; 32]> {
    <[u8; 32]>::try_from(bytes)
        .map_err(|_| DatabaseError::Corrupt("stored hash is not 32 bytes".into()))
}
