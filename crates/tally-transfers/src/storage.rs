//! SQLite storage for transfers and their reference entities.
//!
//! Accounts and blocks are shared by many transfers and are only ever
//! created with `INSERT .. ON CONFLICT DO NOTHING`, so concurrent or repeated
//! ensures never duplicate or overwrite a row. Amounts are decimal TEXT.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tally_common::{biguint_to_text, text_to_biguint};

use crate::error::{TransferError, TransferResult};
use crate::metrics;
use crate::record::TransferRecord;
use crate::token::TokenInfo;

/// Account reference entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    pub address: String,
    pub transfer_count: u64,
}

/// Block reference entity. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRow {
    pub hash: String,
    pub number: u64,
    /// Milliseconds.
    pub timestamp: u64,
}

/// Idempotent reference writes plus the transfer table.
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Create a minimal account for every absent address.
    async fn ensure_accounts(&self, addresses: &[String]) -> TransferResult<()>;

    /// Create the block if absent. Never overwrites an existing block.
    async fn ensure_block(&self, block: &BlockRow) -> TransferResult<()>;

    /// Insert the transfer, or overwrite the one stored under the same id.
    async fn upsert_transfer(&self, record: &TransferRecord) -> TransferResult<()>;

    async fn get_transfer(&self, id: &str) -> TransferResult<Option<TransferRecord>>;

    async fn get_account(&self, address: &str) -> TransferResult<Option<AccountRow>>;

    async fn get_block(&self, hash: &str) -> TransferResult<Option<BlockRow>>;

    async fn transfer_count(&self) -> TransferResult<u64>;

    async fn account_count(&self) -> TransferResult<u64>;

    /// Highest block number with a stored block.
    async fn latest_block(&self) -> TransferResult<Option<u64>>;
}

/// Per-account transfer participation counters.
#[async_trait]
pub trait StatisticsAggregator: Send + Sync {
    /// Increment the counter of every address, once per occurrence.
    async fn update_transfer_statistics(&self, addresses: &[String]) -> TransferResult<()>;
}

pub struct SqliteTransferStore {
    conn: Arc<Mutex<Connection>>,
}

fn store_err(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> TransferError {
    move |e| {
        tracing::error!(
            target: "tally_transfers::storage",
            operation,
            error = %e,
            "Storage operation failed"
        );
        metrics::record_store_error(operation);
        TransferError::store(operation, e)
    }
}

impl SqliteTransferStore {
    /// Create or open the database.
    pub fn new(db_path: &str) -> TransferResult<Self> {
        let conn = Connection::open(db_path).map_err(store_err("open"))?;

        // WAL: readers don't block the writer. NORMAL sync is safe with WAL.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA cache_size=-64000;
             PRAGMA temp_store=MEMORY;
             PRAGMA busy_timeout=5000;",
        )
        .map_err(store_err("configure"))?;

        tracing::info!(
            target: "tally_transfers::storage",
            path = db_path,
            "SQLite configured: WAL mode, 64MB cache, NORMAL sync"
        );

        Self::with_connection(conn)
    }

    /// Private in-memory database, for tests and dry runs.
    pub fn in_memory() -> TransferResult<Self> {
        let conn = Connection::open_in_memory().map_err(store_err("open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> TransferResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                address TEXT PRIMARY KEY,
                transfer_count INTEGER NOT NULL DEFAULT 0
             );

             CREATE TABLE IF NOT EXISTS blocks (
                hash TEXT PRIMARY KEY,
                number INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_blocks_number ON blocks(number);

             CREATE TABLE IF NOT EXISTS transfers (
                id TEXT PRIMARY KEY,
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                amount TEXT NOT NULL,
                fees TEXT NOT NULL,
                status INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                block_id TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                extrinsic_hash TEXT,
                event_index INTEGER NOT NULL,
                token_name TEXT NOT NULL,
                token_decimals INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_transfers_from ON transfers(from_id, block_number DESC);
             CREATE INDEX IF NOT EXISTS idx_transfers_to ON transfers(to_id, block_number DESC);
             CREATE INDEX IF NOT EXISTS idx_transfers_block ON transfers(block_number);",
        )
        .map_err(store_err("create_schema"))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self, operation: &'static str) -> TransferResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            metrics::record_store_error(operation);
            TransferError::store(operation, e.to_string())
        })
    }

    fn count(&self, operation: &'static str, sql: &str) -> TransferResult<u64> {
        let conn = self.conn(operation)?;
        let count: i64 = conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(store_err(operation))?;
        Ok(count as u64)
    }
}

fn transfer_from_row(row: &Row<'_>) -> rusqlite::Result<(TransferRecord, String, String)> {
    let amount: String = row.get("amount")?;
    let fees: String = row.get("fees")?;
    let record = TransferRecord {
        id: row.get("id")?,
        from: row.get("from_id")?,
        to: row.get("to_id")?,
        amount: Default::default(),
        fees: Default::default(),
        status: row.get("status")?,
        timestamp: row.get::<_, i64>("timestamp")? as u64,
        block_hash: row.get("block_id")?,
        block_number: row.get::<_, i64>("block_number")? as u64,
        extrinsic_hash: row.get("extrinsic_hash")?,
        event_index: row.get::<_, i64>("event_index")? as u32,
        token: TokenInfo::new(
            row.get::<_, String>("token_name")?,
            row.get::<_, i64>("token_decimals")? as u8,
        ),
    };
    Ok((record, amount, fees))
}

#[async_trait]
impl TransferStore for SqliteTransferStore {
    async fn ensure_accounts(&self, addresses: &[String]) -> TransferResult<()> {
        let unique: BTreeSet<&str> = addresses.iter().map(String::as_str).collect();

        let mut conn = self.conn("ensure_accounts")?;
        let tx = conn.transaction().map_err(store_err("ensure_accounts"))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO accounts (address) VALUES (?1)
                     ON CONFLICT(address) DO NOTHING",
                )
                .map_err(store_err("ensure_accounts"))?;
            for address in &unique {
                stmt.execute(params![address])
                    .map_err(store_err("ensure_accounts"))?;
            }
        }
        tx.commit().map_err(store_err("ensure_accounts"))?;

        tracing::trace!(
            target: "tally_transfers::storage",
            accounts = unique.len(),
            "Ensured accounts"
        );
        Ok(())
    }

    async fn ensure_block(&self, block: &BlockRow) -> TransferResult<()> {
        let conn = self.conn("ensure_block")?;
        let inserted = conn
            .execute(
                "INSERT INTO blocks (hash, number, timestamp) VALUES (?1, ?2, ?3)
                 ON CONFLICT(hash) DO NOTHING",
                params![block.hash, block.number as i64, block.timestamp as i64],
            )
            .map_err(store_err("ensure_block"))?;

        if inserted > 0 {
            tracing::trace!(
                target: "tally_transfers::storage",
                block_number = block.number,
                block_hash = %block.hash,
                "Created block"
            );
        }
        Ok(())
    }

    async fn upsert_transfer(&self, record: &TransferRecord) -> TransferResult<()> {
        let conn = self.conn("upsert_transfer")?;
        conn.execute(
            "INSERT INTO transfers (
                id, from_id, to_id, amount, fees, status, timestamp, block_id,
                block_number, extrinsic_hash, event_index, token_name, token_decimals
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                from_id = excluded.from_id,
                to_id = excluded.to_id,
                amount = excluded.amount,
                fees = excluded.fees,
                status = excluded.status,
                timestamp = excluded.timestamp,
                block_id = excluded.block_id,
                block_number = excluded.block_number,
                extrinsic_hash = excluded.extrinsic_hash,
                event_index = excluded.event_index,
                token_name = excluded.token_name,
                token_decimals = excluded.token_decimals",
            params![
                record.id,
                record.from,
                record.to,
                biguint_to_text(&record.amount),
                biguint_to_text(&record.fees),
                record.status,
                record.timestamp as i64,
                record.block_hash,
                record.block_number as i64,
                record.extrinsic_hash,
                record.event_index as i64,
                record.token.name,
                record.token.decimals as i64,
            ],
        )
        .map_err(store_err("upsert_transfer"))?;
        Ok(())
    }

    async fn get_transfer(&self, id: &str) -> TransferResult<Option<TransferRecord>> {
        let conn = self.conn("get_transfer")?;
        let row = conn
            .query_row(
                "SELECT * FROM transfers WHERE id = ?1",
                params![id],
                transfer_from_row,
            )
            .optional()
            .map_err(store_err("get_transfer"))?;

        let Some((mut record, amount, fees)) = row else {
            return Ok(None);
        };
        record.amount =
            text_to_biguint(&amount).map_err(|e| TransferError::store("get_transfer", e))?;
        record.fees =
            text_to_biguint(&fees).map_err(|e| TransferError::store("get_transfer", e))?;
        Ok(Some(record))
    }

    async fn get_account(&self, address: &str) -> TransferResult<Option<AccountRow>> {
        let conn = self.conn("get_account")?;
        conn.query_row(
            "SELECT address, transfer_count FROM accounts WHERE address = ?1",
            params![address],
            |row| {
                Ok(AccountRow {
                    address: row.get(0)?,
                    transfer_count: row.get::<_, i64>(1)? as u64,
                })
            },
        )
        .optional()
        .map_err(store_err("get_account"))
    }

    async fn get_block(&self, hash: &str) -> TransferResult<Option<BlockRow>> {
        let conn = self.conn("get_block")?;
        conn.query_row(
            "SELECT hash, number, timestamp FROM blocks WHERE hash = ?1",
            params![hash],
            |row| {
                Ok(BlockRow {
                    hash: row.get(0)?,
                    number: row.get::<_, i64>(1)? as u64,
                    timestamp: row.get::<_, i64>(2)? as u64,
                })
            },
        )
        .optional()
        .map_err(store_err("get_block"))
    }

    async fn transfer_count(&self) -> TransferResult<u64> {
        self.count("transfer_count", "SELECT COUNT(*) FROM transfers")
    }

    async fn account_count(&self) -> TransferResult<u64> {
        self.count("account_count", "SELECT COUNT(*) FROM accounts")
    }

    async fn latest_block(&self) -> TransferResult<Option<u64>> {
        let conn = self.conn("latest_block")?;
        let latest: Option<i64> = conn
            .query_row("SELECT MAX(number) FROM blocks", [], |row| row.get(0))
            .map_err(store_err("latest_block"))?;
        Ok(latest.map(|n| n as u64))
    }
}

#[async_trait]
impl StatisticsAggregator for SqliteTransferStore {
    async fn update_transfer_statistics(&self, addresses: &[String]) -> TransferResult<()> {
        let mut conn = self.conn("update_transfer_statistics")?;
        let tx = conn
            .transaction()
            .map_err(store_err("update_transfer_statistics"))?;
        {
            // Upsert keeps the increment atomic even if the account is missing.
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO accounts (address, transfer_count) VALUES (?1, 1)
                     ON CONFLICT(address) DO UPDATE SET transfer_count = transfer_count + 1",
                )
                .map_err(store_err("update_transfer_statistics"))?;
            for address in addresses {
                stmt.execute(params![address])
                    .map_err(store_err("update_transfer_statistics"))?;
            }
        }
        tx.commit().map_err(store_err("update_transfer_statistics"))?;
        Ok(())
    }
}
