//! The Large-Content Store: a durable `nodeId -> bytes` table for file payloads too
//! large to keep inline in node settings, plus the size policy that decides which
//! payloads qualify.

use std::path::Path;

use flow_contracts::NodeId;
use rusqlite::{params, Connection};

mod error;
pub use error::StoreError;

/// The inline/persistent size boundary: 5 MiB, measured in UTF-8 bytes of the content.
/// Content strictly below this threshold is expected to live inline in the caller's own
/// settings record; at or above it, the caller should route through this store.
pub const INLINE_THRESHOLD_BYTES: usize = 5 * 1024 * 1024;

/// Where a given payload should live, per [`policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Inline,
    Persistent,
}

/// Decide where a payload belongs based on its byte length alone.
pub fn policy(content: &[u8]) -> Placement {
    if content.len() >= INLINE_THRESHOLD_BYTES {
        Placement::Persistent
    } else {
        Placement::Inline
    }
}

const BOOTSTRAP_SQL: &str = "
CREATE TABLE IF NOT EXISTS large_content (
    node_id     INTEGER PRIMARY KEY,
    content     BLOB NOT NULL,
    content_hash TEXT NOT NULL,
    written_at  TEXT NOT NULL
);
";

/// Persistent store of large file payloads, backed by a bundled SQLite database.
/// Single logical writer per document, per the concurrency model: callers are
/// responsible for not interleaving writes to the same node id from multiple tasks.
pub struct LargeContentStore {
    conn: Connection,
}

impl LargeContentStore {
    /// Open (creating if absent) the store at `path`, running its bootstrap schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.execute_batch(BOOTSTRAP_SQL).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { conn })
    }

    /// An in-memory store, used by tests and by short-lived execution passes that don't
    /// need the content to outlive the process.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.execute_batch(BOOTSTRAP_SQL).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Write `content` for `node_id`, overwriting any prior value atomically.
    pub fn put(&self, node_id: NodeId, content: &[u8]) -> Result<(), StoreError> {
        let hash = blake3::hash(content).to_hex().to_string();
        let written_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO large_content (node_id, content, content_hash, written_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(node_id) DO UPDATE SET
                    content = excluded.content,
                    content_hash = excluded.content_hash,
                    written_at = excluded.written_at",
                params![node_id, content, hash, written_at],
            )
            .map_err(|e| StoreError::Full(e.to_string()))?;
        log::debug!(target: "flow_store", "wrote {} bytes for node {node_id}", content.len());
        Ok(())
    }

    /// Return the last successfully written content for `node_id`, if any.
    pub fn get(&self, node_id: NodeId) -> Result<Option<Vec<u8>>, StoreError> {
        let row: Option<(Vec<u8>, String)> = self
            .conn
            .query_row(
                "SELECT content, content_hash FROM large_content WHERE node_id = ?1",
                params![node_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Unavailable(other.to_string())),
            })?;

        match row {
            Some((content, expected_hash)) => {
                let actual_hash = blake3::hash(&content).to_hex().to_string();
                if actual_hash != expected_hash {
                    return Err(StoreError::Corrupt(node_id));
                }
                Ok(Some(content))
            }
            None => Ok(None),
        }
    }

    /// Remove `node_id`'s entry. Idempotent: removing an absent entry is not an error.
    pub fn delete(&self, node_id: NodeId) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM large_content WHERE node_id = ?1", params![node_id])
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    /// All node ids currently holding a persistent entry.
    pub fn keys(&self) -> Result<Vec<NodeId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT node_id FROM large_content")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Drop every entry.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM large_content", []).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
