//! SQLite storage backend using `sqlx`.
//!
//! Every entity table has its natural key as primary key, and every write is
//! an `INSERT … ON CONFLICT DO UPDATE` that expresses the same merge rules
//! as [`paindex_core::Merge`]. A commit runs all upserts and the cursor write
//! in a single SQL transaction.
//!
//! # Usage
//!
//! ```rust,no_run
//! use paindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("./paindex.db").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction as SqlTransaction};
use tracing::debug;

use paindex_core::{
    Action, CommitmentTreeRoot, ComplianceUnit, CursorStore, DecodeFailure, DecodingStatus,
    EntityStore, ForwarderCall, GraphDelta, IndexerError, IngestionCursor, LogicInput, PairKey,
    Payload, Resource, StoreStats, Transaction,
};

type Tx = SqlTransaction<'static, Sqlite>;

fn persistence(context: &'static str) -> impl Fn(sqlx::Error) -> IndexerError {
    move |e| IndexerError::Persistence(format!("{context}: {e}"))
}

fn json_list(items: &[String]) -> Result<String, IndexerError> {
    serde_json::to_string(items).map_err(|e| IndexerError::Persistence(e.to_string()))
}

fn parse_list(raw: &str) -> Result<Vec<String>, IndexerError> {
    serde_json::from_str(raw).map_err(|e| IndexerError::Persistence(e.to_string()))
}

/// Ordered so that `MAX()` in SQL picks the more advanced status.
fn status_rank(status: DecodingStatus) -> i64 {
    match status {
        DecodingStatus::Pending => 0,
        DecodingStatus::Failed => 1,
        DecodingStatus::Success => 2,
    }
}

fn status_from_rank(rank: i64) -> DecodingStatus {
    match rank {
        2 => DecodingStatus::Success,
        1 => DecodingStatus::Failed,
        _ => DecodingStatus::Pending,
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS transactions (
        chain_id          INTEGER NOT NULL,
        tx_hash           TEXT    NOT NULL,
        contract_address  TEXT    NOT NULL,
        block_number      INTEGER NOT NULL,
        timestamp         INTEGER,
        log_index         INTEGER NOT NULL,
        tags              TEXT    NOT NULL,
        logic_refs        TEXT    NOT NULL,
        delta_proof       TEXT,
        aggregation_proof TEXT,
        PRIMARY KEY (chain_id, tx_hash)
    )",
    "CREATE TABLE IF NOT EXISTS actions (
        chain_id          INTEGER NOT NULL,
        tx_hash           TEXT    NOT NULL,
        log_index         INTEGER NOT NULL,
        idx               INTEGER NOT NULL,
        block_number      INTEGER NOT NULL,
        action_tree_root  TEXT    NOT NULL,
        tag_count         INTEGER NOT NULL,
        transaction_id    TEXT    NOT NULL,
        calldata_matched  INTEGER NOT NULL,
        PRIMARY KEY (chain_id, tx_hash, log_index)
    )",
    "CREATE TABLE IF NOT EXISTS compliance_units (
        id                             TEXT PRIMARY KEY,
        chain_id                       INTEGER NOT NULL,
        action_id                      TEXT    NOT NULL,
        idx                            INTEGER NOT NULL,
        consumed_nullifier             TEXT    NOT NULL,
        consumed_logic_ref             TEXT    NOT NULL,
        consumed_commitment_tree_root  TEXT    NOT NULL,
        created_commitment             TEXT    NOT NULL,
        created_logic_ref              TEXT    NOT NULL,
        unit_delta_x                   TEXT    NOT NULL,
        unit_delta_y                   TEXT    NOT NULL,
        proof                          TEXT,
        consumed_resource_id           TEXT    NOT NULL,
        created_resource_id            TEXT    NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS logic_inputs (
        id                         TEXT PRIMARY KEY,
        chain_id                   INTEGER NOT NULL,
        action_id                  TEXT    NOT NULL,
        idx                        INTEGER NOT NULL,
        tag                        TEXT    NOT NULL,
        verifying_key              TEXT    NOT NULL,
        is_consumed                INTEGER NOT NULL,
        resource_payload_count     INTEGER NOT NULL,
        discovery_payload_count    INTEGER NOT NULL,
        external_payload_count     INTEGER NOT NULL,
        application_payload_count  INTEGER NOT NULL,
        proof                      TEXT,
        resource_id                TEXT    NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS resources (
        chain_id                  INTEGER NOT NULL,
        tag                       TEXT    NOT NULL,
        idx                       INTEGER,
        is_consumed               INTEGER,
        block_number              INTEGER,
        logic_ref                 TEXT,
        label_ref                 TEXT,
        value_ref                 TEXT,
        nullifier_key_commitment  TEXT,
        nonce                     TEXT,
        rand_seed                 TEXT,
        quantity                  TEXT,
        ephemeral                 INTEGER,
        decoding_status           INTEGER NOT NULL,
        decoding_error            TEXT,
        transaction_id            TEXT,
        compliance_unit_id        TEXT,
        logic_input_id            TEXT,
        PRIMARY KEY (chain_id, tag)
    )",
    "CREATE TABLE IF NOT EXISTS payloads (
        chain_id        INTEGER NOT NULL,
        tx_hash         TEXT    NOT NULL,
        log_index       INTEGER NOT NULL,
        block_number    INTEGER NOT NULL,
        kind            TEXT    NOT NULL,
        tag             TEXT    NOT NULL,
        idx             INTEGER NOT NULL,
        blob            TEXT    NOT NULL,
        resource_id     TEXT    NOT NULL,
        transaction_id  TEXT    NOT NULL,
        PRIMARY KEY (chain_id, tx_hash, log_index)
    )",
    "CREATE TABLE IF NOT EXISTS commitment_tree_roots (
        chain_id      INTEGER NOT NULL,
        root          TEXT    NOT NULL,
        block_number  INTEGER NOT NULL,
        tx_hash       TEXT    NOT NULL,
        log_index     INTEGER NOT NULL,
        timestamp     INTEGER,
        PRIMARY KEY (chain_id, root)
    )",
    "CREATE TABLE IF NOT EXISTS forwarder_calls (
        chain_id        INTEGER NOT NULL,
        tx_hash         TEXT    NOT NULL,
        log_index       INTEGER NOT NULL,
        block_number    INTEGER NOT NULL,
        forwarder       TEXT    NOT NULL,
        input           TEXT    NOT NULL,
        output          TEXT    NOT NULL,
        transaction_id  TEXT    NOT NULL,
        PRIMARY KEY (chain_id, tx_hash, log_index)
    )",
    "CREATE TABLE IF NOT EXISTS decode_failures (
        chain_id      INTEGER NOT NULL,
        tx_hash       TEXT    NOT NULL,
        log_index     INTEGER NOT NULL,
        source        TEXT    NOT NULL,
        block_number  INTEGER NOT NULL,
        reason        TEXT    NOT NULL,
        topics        TEXT    NOT NULL,
        data          TEXT    NOT NULL,
        PRIMARY KEY (chain_id, tx_hash, log_index, source)
    )",
    "CREATE TABLE IF NOT EXISTS cursors (
        network             TEXT NOT NULL,
        contract            TEXT NOT NULL,
        logs_block          INTEGER,
        transactions_block  INTEGER,
        updated_at          INTEGER NOT NULL,
        PRIMARY KEY (network, contract)
    )",
    "CREATE INDEX IF NOT EXISTS idx_resources_transaction ON resources (transaction_id)",
    "CREATE INDEX IF NOT EXISTS idx_payloads_tag ON payloads (chain_id, tag)",
];

/// SQLite-backed entity store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = format!("sqlite:{path}?mode=rwc");
        let pool = SqlitePool::connect(&url)
            .await
            .map_err(persistence("open"))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing).
    pub async fn in_memory() -> Result<Self, IndexerError> {
        // Each connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(persistence("open"))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await
            .map_err(persistence("pragma"))?;
        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(persistence("schema"))?;
        }
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<u64, IndexerError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(persistence("count"))?;
        Ok(row.get::<i64, _>("n") as u64)
    }
}

// ─── Upserts ─────────────────────────────────────────────────────────────────

async fn upsert_transaction(tx: &mut Tx, t: &Transaction) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO transactions
            (chain_id, tx_hash, contract_address, block_number, timestamp, log_index,
             tags, logic_refs, delta_proof, aggregation_proof)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (chain_id, tx_hash) DO UPDATE SET
            tags              = CASE WHEN excluded.tags != '[]' THEN excluded.tags ELSE transactions.tags END,
            logic_refs        = CASE WHEN excluded.tags != '[]' THEN excluded.logic_refs ELSE transactions.logic_refs END,
            block_number      = excluded.block_number,
            log_index         = excluded.log_index,
            timestamp         = COALESCE(transactions.timestamp, excluded.timestamp),
            delta_proof       = COALESCE(transactions.delta_proof, excluded.delta_proof),
            aggregation_proof = COALESCE(transactions.aggregation_proof, excluded.aggregation_proof)",
    )
    .bind(t.chain_id as i64)
    .bind(&t.tx_hash)
    .bind(&t.contract_address)
    .bind(t.block_number as i64)
    .bind(t.timestamp)
    .bind(t.log_index as i64)
    .bind(json_list(&t.tags)?)
    .bind(json_list(&t.logic_refs)?)
    .bind(&t.delta_proof)
    .bind(&t.aggregation_proof)
    .execute(&mut **tx)
    .await
    .map_err(persistence("upsert transaction"))?;
    Ok(())
}

async fn upsert_action(tx: &mut Tx, a: &Action) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO actions
            (chain_id, tx_hash, log_index, idx, block_number, action_tree_root, tag_count,
             transaction_id, calldata_matched)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (chain_id, tx_hash, log_index) DO UPDATE SET
            idx              = excluded.idx,
            calldata_matched = MAX(actions.calldata_matched, excluded.calldata_matched)",
    )
    .bind(a.chain_id as i64)
    .bind(&a.tx_hash)
    .bind(a.log_index as i64)
    .bind(a.index as i64)
    .bind(a.block_number as i64)
    .bind(&a.action_tree_root)
    .bind(a.tag_count as i64)
    .bind(&a.transaction_id)
    .bind(a.calldata_matched)
    .execute(&mut **tx)
    .await
    .map_err(persistence("upsert action"))?;
    Ok(())
}

async fn upsert_compliance_unit(tx: &mut Tx, cu: &ComplianceUnit) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO compliance_units
            (id, chain_id, action_id, idx, consumed_nullifier, consumed_logic_ref,
             consumed_commitment_tree_root, created_commitment, created_logic_ref,
             unit_delta_x, unit_delta_y, proof, consumed_resource_id, created_resource_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
            proof = COALESCE(compliance_units.proof, excluded.proof)",
    )
    .bind(cu.id())
    .bind(cu.chain_id as i64)
    .bind(&cu.action_id)
    .bind(cu.index as i64)
    .bind(&cu.consumed_nullifier)
    .bind(&cu.consumed_logic_ref)
    .bind(&cu.consumed_commitment_tree_root)
    .bind(&cu.created_commitment)
    .bind(&cu.created_logic_ref)
    .bind(&cu.unit_delta_x)
    .bind(&cu.unit_delta_y)
    .bind(&cu.proof)
    .bind(&cu.consumed_resource_id)
    .bind(&cu.created_resource_id)
    .execute(&mut **tx)
    .await
    .map_err(persistence("upsert compliance unit"))?;
    Ok(())
}

async fn upsert_logic_input(tx: &mut Tx, li: &LogicInput) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO logic_inputs
            (id, chain_id, action_id, idx, tag, verifying_key, is_consumed,
             resource_payload_count, discovery_payload_count, external_payload_count,
             application_payload_count, proof, resource_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
            proof = COALESCE(logic_inputs.proof, excluded.proof)",
    )
    .bind(li.id())
    .bind(li.chain_id as i64)
    .bind(&li.action_id)
    .bind(li.index as i64)
    .bind(&li.tag)
    .bind(&li.verifying_key)
    .bind(li.is_consumed)
    .bind(li.resource_payload_count as i64)
    .bind(li.discovery_payload_count as i64)
    .bind(li.external_payload_count as i64)
    .bind(li.application_payload_count as i64)
    .bind(&li.proof)
    .bind(&li.resource_id)
    .execute(&mut **tx)
    .await
    .map_err(persistence("upsert logic input"))?;
    Ok(())
}

async fn upsert_resource(tx: &mut Tx, r: &Resource) -> Result<(), IndexerError> {
    // SET expressions all see the pre-update row, so the status comparison
    // in `decoding_error` is against the stored status.
    sqlx::query(
        "INSERT INTO resources
            (chain_id, tag, idx, is_consumed, block_number, logic_ref, label_ref, value_ref,
             nullifier_key_commitment, nonce, rand_seed, quantity, ephemeral,
             decoding_status, decoding_error, transaction_id, compliance_unit_id, logic_input_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (chain_id, tag) DO UPDATE SET
            idx                      = COALESCE(excluded.idx, resources.idx),
            is_consumed              = COALESCE(excluded.is_consumed, resources.is_consumed),
            decoding_status          = MAX(resources.decoding_status, excluded.decoding_status),
            decoding_error           = CASE WHEN excluded.decoding_status > resources.decoding_status
                                            THEN excluded.decoding_error
                                            ELSE resources.decoding_error END,
            block_number             = COALESCE(resources.block_number, excluded.block_number),
            logic_ref                = COALESCE(resources.logic_ref, excluded.logic_ref),
            label_ref                = COALESCE(resources.label_ref, excluded.label_ref),
            value_ref                = COALESCE(resources.value_ref, excluded.value_ref),
            nullifier_key_commitment = COALESCE(resources.nullifier_key_commitment, excluded.nullifier_key_commitment),
            nonce                    = COALESCE(resources.nonce, excluded.nonce),
            rand_seed                = COALESCE(resources.rand_seed, excluded.rand_seed),
            quantity                 = COALESCE(resources.quantity, excluded.quantity),
            ephemeral                = COALESCE(resources.ephemeral, excluded.ephemeral),
            transaction_id           = COALESCE(resources.transaction_id, excluded.transaction_id),
            compliance_unit_id       = COALESCE(resources.compliance_unit_id, excluded.compliance_unit_id),
            logic_input_id           = COALESCE(resources.logic_input_id, excluded.logic_input_id)",
    )
    .bind(r.chain_id as i64)
    .bind(&r.tag)
    .bind(r.index.map(|i| i as i64))
    .bind(r.is_consumed)
    .bind(r.block_number.map(|b| b as i64))
    .bind(&r.logic_ref)
    .bind(&r.label_ref)
    .bind(&r.value_ref)
    .bind(&r.nullifier_key_commitment)
    .bind(&r.nonce)
    .bind(&r.rand_seed)
    .bind(&r.quantity)
    .bind(r.ephemeral)
    .bind(status_rank(r.decoding_status))
    .bind(&r.decoding_error)
    .bind(&r.transaction_id)
    .bind(&r.compliance_unit_id)
    .bind(&r.logic_input_id)
    .execute(&mut **tx)
    .await
    .map_err(persistence("upsert resource"))?;
    Ok(())
}

async fn upsert_payload(tx: &mut Tx, p: &Payload) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO payloads
            (chain_id, tx_hash, log_index, block_number, kind, tag, idx, blob,
             resource_id, transaction_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (chain_id, tx_hash, log_index) DO NOTHING",
    )
    .bind(p.chain_id as i64)
    .bind(&p.tx_hash)
    .bind(p.log_index as i64)
    .bind(p.block_number as i64)
    .bind(p.kind.as_str())
    .bind(&p.tag)
    .bind(p.index as i64)
    .bind(&p.blob)
    .bind(&p.resource_id)
    .bind(&p.transaction_id)
    .execute(&mut **tx)
    .await
    .map_err(persistence("upsert payload"))?;
    Ok(())
}

async fn upsert_root(tx: &mut Tx, root: &CommitmentTreeRoot) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO commitment_tree_roots
            (chain_id, root, block_number, tx_hash, log_index, timestamp)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (chain_id, root) DO UPDATE SET
            timestamp = COALESCE(commitment_tree_roots.timestamp, excluded.timestamp)",
    )
    .bind(root.chain_id as i64)
    .bind(&root.root)
    .bind(root.block_number as i64)
    .bind(&root.tx_hash)
    .bind(root.log_index as i64)
    .bind(root.timestamp)
    .execute(&mut **tx)
    .await
    .map_err(persistence("upsert commitment tree root"))?;
    Ok(())
}

async fn upsert_forwarder_call(tx: &mut Tx, f: &ForwarderCall) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO forwarder_calls
            (chain_id, tx_hash, log_index, block_number, forwarder, input, output, transaction_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (chain_id, tx_hash, log_index) DO NOTHING",
    )
    .bind(f.chain_id as i64)
    .bind(&f.tx_hash)
    .bind(f.log_index as i64)
    .bind(f.block_number as i64)
    .bind(&f.forwarder)
    .bind(&f.input)
    .bind(&f.output)
    .bind(&f.transaction_id)
    .execute(&mut **tx)
    .await
    .map_err(persistence("upsert forwarder call"))?;
    Ok(())
}

async fn upsert_failure(tx: &mut Tx, f: &DecodeFailure) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO decode_failures
            (chain_id, tx_hash, log_index, source, block_number, reason, topics, data)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (chain_id, tx_hash, log_index, source) DO UPDATE SET
            reason = excluded.reason",
    )
    .bind(f.chain_id as i64)
    .bind(&f.tx_hash)
    .bind(f.log_index as i64)
    .bind(f.source.label())
    .bind(f.block_number as i64)
    .bind(&f.reason)
    .bind(json_list(&f.topics)?)
    .bind(&f.data)
    .execute(&mut **tx)
    .await
    .map_err(persistence("upsert decode failure"))?;
    Ok(())
}

/// Each stream keeps the later block; a stale committer cannot rewind it.
async fn write_cursor(tx: &mut Tx, cursor: &IngestionCursor) -> Result<(), IndexerError> {
    sqlx::query(
        "INSERT INTO cursors
            (network, contract, logs_block, transactions_block, updated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (network, contract) DO UPDATE SET
            logs_block         = CASE WHEN cursors.logs_block IS NULL
                                        OR excluded.logs_block > cursors.logs_block
                                      THEN excluded.logs_block
                                      ELSE cursors.logs_block END,
            transactions_block = CASE WHEN cursors.transactions_block IS NULL
                                        OR excluded.transactions_block > cursors.transactions_block
                                      THEN excluded.transactions_block
                                      ELSE cursors.transactions_block END,
            updated_at         = excluded.updated_at",
    )
    .bind(&cursor.network)
    .bind(&cursor.contract)
    .bind(cursor.logs_block.map(|b| b as i64))
    .bind(cursor.transactions_block.map(|b| b as i64))
    .bind(cursor.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(persistence("write cursor"))?;
    Ok(())
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn cursor_from_row(row: &SqliteRow) -> IngestionCursor {
    IngestionCursor {
        network: row.get("network"),
        contract: row.get("contract"),
        logs_block: row.get::<Option<i64>, _>("logs_block").map(|b| b as u64),
        transactions_block: row
            .get::<Option<i64>, _>("transactions_block")
            .map(|b| b as u64),
        updated_at: row.get("updated_at"),
    }
}

fn resource_from_row(row: &SqliteRow) -> Resource {
    Resource {
        chain_id: row.get::<i64, _>("chain_id") as u64,
        tag: row.get("tag"),
        index: row.get::<Option<i64>, _>("idx").map(|i| i as u32),
        is_consumed: row.get("is_consumed"),
        block_number: row.get::<Option<i64>, _>("block_number").map(|b| b as u64),
        logic_ref: row.get("logic_ref"),
        label_ref: row.get("label_ref"),
        value_ref: row.get("value_ref"),
        nullifier_key_commitment: row.get("nullifier_key_commitment"),
        nonce: row.get("nonce"),
        rand_seed: row.get("rand_seed"),
        quantity: row.get("quantity"),
        ephemeral: row.get("ephemeral"),
        decoding_status: status_from_rank(row.get("decoding_status")),
        decoding_error: row.get("decoding_error"),
        transaction_id: row.get("transaction_id"),
        compliance_unit_id: row.get("compliance_unit_id"),
        logic_input_id: row.get("logic_input_id"),
    }
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, IndexerError> {
    Ok(Transaction {
        chain_id: row.get::<i64, _>("chain_id") as u64,
        tx_hash: row.get("tx_hash"),
        contract_address: row.get("contract_address"),
        block_number: row.get::<i64, _>("block_number") as u64,
        timestamp: row.get("timestamp"),
        log_index: row.get::<i64, _>("log_index") as u32,
        tags: parse_list(&row.get::<String, _>("tags"))?,
        logic_refs: parse_list(&row.get::<String, _>("logic_refs"))?,
        delta_proof: row.get("delta_proof"),
        aggregation_proof: row.get("aggregation_proof"),
    })
}

// ─── Trait impls ─────────────────────────────────────────────────────────────

#[async_trait]
impl CursorStore for SqliteStore {
    async fn load_cursor(&self, key: &PairKey) -> Result<Option<IngestionCursor>, IndexerError> {
        let row = sqlx::query("SELECT * FROM cursors WHERE network = ? AND contract = ?")
            .bind(&key.network)
            .bind(&key.contract)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence("load cursor"))?;
        Ok(row.as_ref().map(cursor_from_row))
    }

    async fn list_cursors(&self) -> Result<Vec<IngestionCursor>, IndexerError> {
        let rows = sqlx::query("SELECT * FROM cursors ORDER BY network, contract")
            .fetch_all(&self.pool)
            .await
            .map_err(persistence("list cursors"))?;
        Ok(rows.iter().map(cursor_from_row).collect())
    }

    async fn delete_cursor(&self, key: &PairKey) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM cursors WHERE network = ? AND contract = ?")
            .bind(&key.network)
            .bind(&key.contract)
            .execute(&self.pool)
            .await
            .map_err(persistence("delete cursor"))?;
        Ok(())
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn commit(&self, delta: &GraphDelta, cursor: &IngestionCursor) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(persistence("begin"))?;

        for t in &delta.transactions {
            upsert_transaction(&mut tx, t).await?;
        }
        for a in &delta.actions {
            upsert_action(&mut tx, a).await?;
        }
        for cu in &delta.compliance_units {
            upsert_compliance_unit(&mut tx, cu).await?;
        }
        for li in &delta.logic_inputs {
            upsert_logic_input(&mut tx, li).await?;
        }
        for r in &delta.resources {
            upsert_resource(&mut tx, r).await?;
        }
        for p in &delta.payloads {
            upsert_payload(&mut tx, p).await?;
        }
        for root in &delta.commitment_tree_roots {
            upsert_root(&mut tx, root).await?;
        }
        for f in &delta.forwarder_calls {
            upsert_forwarder_call(&mut tx, f).await?;
        }
        for f in &delta.decode_failures {
            upsert_failure(&mut tx, f).await?;
        }
        write_cursor(&mut tx, cursor).await?;

        // Dropping `tx` on any early return above rolls everything back.
        tx.commit().await.map_err(persistence("commit"))?;
        debug!(
            pair = %cursor.key(),
            logs_block = ?cursor.logs_block,
            upserts = delta.len(),
            "committed"
        );
        Ok(())
    }

    async fn resource(&self, chain_id: u64, tag: &str) -> Result<Option<Resource>, IndexerError> {
        let row = sqlx::query("SELECT * FROM resources WHERE chain_id = ? AND tag = ?")
            .bind(chain_id as i64)
            .bind(tag)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence("load resource"))?;
        Ok(row.as_ref().map(resource_from_row))
    }

    async fn transaction(
        &self,
        chain_id: u64,
        tx_hash: &str,
    ) -> Result<Option<Transaction>, IndexerError> {
        let row = sqlx::query("SELECT * FROM transactions WHERE chain_id = ? AND tx_hash = ?")
            .bind(chain_id as i64)
            .bind(tx_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence("load transaction"))?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn stats(&self) -> Result<StoreStats, IndexerError> {
        Ok(StoreStats {
            transactions: self.count("transactions").await?,
            actions: self.count("actions").await?,
            compliance_units: self.count("compliance_units").await?,
            logic_inputs: self.count("logic_inputs").await?,
            resources: self.count("resources").await?,
            payloads: self.count("payloads").await?,
            commitment_tree_roots: self.count("commitment_tree_roots").await?,
            forwarder_calls: self.count("forwarder_calls").await?,
            decode_failures: self.count("decode_failures").await?,
        })
    }
}
