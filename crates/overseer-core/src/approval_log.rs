//! Append-only audit trail of approval decisions.
//!
//! # Table design
//!
//! `RedbApprovalLog` keeps a single `APPROVALS` table with a 24-byte key:
//! ```text
//! [ timestamp_ms: u64 big-endian (8 bytes) | uuid: 16 bytes ]
//! ```
//!
//! Big-endian timestamps make byte order equal chronological order, so a
//! reverse scan yields newest-first without sorting. Records are never
//! updated or removed.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OverseerError, Result};

// ---------------------------------------------------------------------------
// ApprovalRecord
// ---------------------------------------------------------------------------

/// The outcome of one gate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: Uuid,
    pub step: String,
    pub approved: bool,
    /// Name of the decider that was consulted.
    pub decider: String,
    /// Why the gate failed closed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ApprovalRecord {
    pub fn new(step: &str, approved: bool, decider: &str, note: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            step: step.to_string(),
            approved,
            decider: decider.to_string(),
            note,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApprovalLog
// ---------------------------------------------------------------------------

/// Durable sink for approval records. The gate only ever appends.
pub trait ApprovalLog: Send + Sync {
    fn append(&self, record: &ApprovalRecord) -> Result<()>;
}

// ---------------------------------------------------------------------------
// RedbApprovalLog
// ---------------------------------------------------------------------------

/// Key: 24-byte composite (timestamp_ms big-endian ++ uuid bytes)
/// Value: JSON-encoded ApprovalRecord
const APPROVALS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("approvals");

fn record_key(ts: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

fn db_err(e: impl std::fmt::Display) -> OverseerError {
    OverseerError::ApprovalLog(e.to_string())
}

/// Approval log stored in a redb file in the state directory.
///
/// Open it once and hand it to the gate; the handle owns the database for
/// its whole lifetime.
pub struct RedbApprovalLog {
    db: Database,
}

impl RedbApprovalLog {
    /// Open or create the database at `path`, creating the table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(APPROVALS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// Newest records first, at most `limit` of them.
    ///
    /// For audit views only; the gate never reads its own history.
    pub fn list(&self, limit: usize) -> Result<Vec<ApprovalRecord>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(APPROVALS).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)?.rev().take(limit) {
            let (_, v) = entry.map_err(db_err)?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }
}

impl ApprovalLog for RedbApprovalLog {
    fn append(&self, record: &ApprovalRecord) -> Result<()> {
        let key = record_key(record.timestamp, record.id);
        let value = serde_json::to_vec(record)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(APPROVALS).map_err(db_err)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryApprovalLog
// ---------------------------------------------------------------------------

/// In-process log for embedding and tests.
#[derive(Default)]
pub struct MemoryApprovalLog {
    records: Mutex<Vec<ApprovalRecord>>,
}

impl MemoryApprovalLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest first.
    pub fn records(&self) -> Vec<ApprovalRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl ApprovalLog for MemoryApprovalLog {
    fn append(&self, record: &ApprovalRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| OverseerError::ApprovalLog("log mutex poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
