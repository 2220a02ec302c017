//! SQLite implementation of the BlockStore trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! tokio::spawn_blocking. Blocks are stored whole as CBOR blobs keyed by
//! their hex hash, with height and parent in columns for ordering.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use blockart_core::{Block, BlockHash};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{BlockStore, InsertResult};

/// SQLite-based block store.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteBlockStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBlockStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn encode_block(block: &Block) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(block, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_block(hash_hex: &str, body: &[u8]) -> Result<Block> {
    let block: Block =
        ciborium::from_reader(body).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if block.hash.to_hex() != hash_hex {
        return Err(StoreError::InvalidData(format!(
            "row {} holds block {}",
            hash_hex, block.hash
        )));
    }
    Ok(block)
}

#[async_trait]
impl BlockStore for SqliteBlockStore {
    async fn insert_block(&self, block: &Block) -> Result<InsertResult> {
        let body = encode_block(block)?;
        let hash = block.hash.to_hex();
        let prev = block.prev_hash.to_hex();
        let height = block.height as i64;
        let miner = block.miner.0.to_vec();
        let op_count = block.ops.len() as i64;

        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO blocks (hash, prev_hash, height, miner, op_count, body, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![hash, prev, height, miner, op_count, body, now_millis()],
            )?;
            Ok(if inserted == 0 {
                InsertResult::AlreadyExists
            } else {
                InsertResult::Inserted
            })
        })
        .await
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<Option<Block>> {
        let hash = hash.to_hex();
        self.with_conn(move |conn| {
            let body: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT body FROM blocks WHERE hash = ?1",
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|body| decode_block(&hash, &body)).transpose()
        })
        .await
    }

    async fn has_block(&self, hash: &BlockHash) -> Result<bool> {
        let hash = hash.to_hex();
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM blocks WHERE hash = ?1",
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn load_all(&self) -> Result<Vec<Block>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT hash, body FROM blocks ORDER BY height, hash")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;

            let mut blocks = Vec::new();
            for row in rows {
                let (hash, body) = row?;
                blocks.push(decode_block(&hash, &body)?);
            }
            Ok(blocks)
        })
        .await
    }

    async fn block_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}
