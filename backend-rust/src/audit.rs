//! # audit
//!
//! SHA-256 chained append-only audit log of seating plan mutations.
//!
//! Every save, generation, compaction, clone, deletion and trigger
//! acknowledgement is appended as a block that hashes the previous block's
//! hash. Editing or dropping any line breaks the chain, which
//! [`verify_chain`] detects.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

// ── Audit Event Types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// Manual save from the floor-plan editor
    PlanSaved,
    /// Engine-generated arrangement committed
    PlanGenerated,
    /// Compactor changed the stored plan
    PlanOptimized,
    /// Tables copied to another event
    PlanCloned,
    PlanDeleted,
    /// Sync triggers acknowledged
    TriggersAcknowledged,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

// ── Audit Block ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditBlock {
    pub block_seq: u64,
    pub timestamp_ms: i64,
    pub event_id: String,
    pub owner_id: String,
    /// Hex SHA-256 of the previous block; 64 zeros for the first one
    pub prev_hash: String,
    pub event_type: AuditEventType,
    pub payload_json: String,
    /// SHA-256 of (prev_hash ‖ timestamp ‖ event id ‖ owner id ‖ type ‖ payload)
    pub block_hash: String,
}

impl AuditBlock {
    fn compute_hash(
        prev_hash: &str,
        timestamp_ms: i64,
        event_id: &str,
        owner_id: &str,
        event_type: AuditEventType,
        payload_json: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prev_hash.as_bytes());
        hasher.update(timestamp_ms.to_le_bytes());
        hasher.update(event_id.as_bytes());
        hasher.update(owner_id.as_bytes());
        hasher.update(event_type.to_string().as_bytes());
        hasher.update(payload_json.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn seal(
        block_seq: u64,
        timestamp_ms: i64,
        event_id: &str,
        owner_id: &str,
        prev_hash: String,
        event_type: AuditEventType,
        payload_json: String,
    ) -> Self {
        let block_hash =
            Self::compute_hash(&prev_hash, timestamp_ms, event_id, owner_id, event_type, &payload_json);
        Self {
            block_seq,
            timestamp_ms,
            event_id: event_id.to_string(),
            owner_id: owner_id.to_string(),
            prev_hash,
            event_type,
            payload_json,
            block_hash,
        }
    }

    pub fn verify(&self) -> bool {
        Self::compute_hash(
            &self.prev_hash,
            self.timestamp_ms,
            &self.event_id,
            &self.owner_id,
            self.event_type,
            &self.payload_json,
        ) == self.block_hash
    }
}

/// Check every block's own hash and its link to the block before it.
pub fn verify_chain(blocks: &[AuditBlock]) -> bool {
    let mut prev = GENESIS_HASH;
    for block in blocks {
        if block.prev_hash != prev || !block.verify() {
            return false;
        }
        prev = &block.block_hash;
    }
    true
}

// ── Audit Logger ──────────────────────────────────────────────────────────────

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

struct ChainHead {
    block_seq: u64,
    last_hash: String,
}

/// Append-only chained logger writing JSON lines to the configured path.
#[derive(Clone)]
pub struct AuditLogger {
    path: Arc<PathBuf>,
    head: Arc<Mutex<ChainHead>>,
}

impl AuditLogger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            head: Arc::new(Mutex::new(ChainHead {
                block_seq: 0,
                last_hash: GENESIS_HASH.to_string(),
            })),
        }
    }

    /// Resume the chain from an existing log so restarts keep it unbroken.
    pub async fn resume(path: PathBuf) -> Self {
        let logger = Self::new(path);
        let Ok(data) = tokio::fs::read_to_string(logger.path.as_ref()).await else {
            return logger;
        };
        let blocks: Vec<AuditBlock> = data
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        if !verify_chain(&blocks) {
            warn!("Audit: chain in {} does not verify; continuing from its last block", logger.path.display());
        }
        if let Some(last) = blocks.into_iter().last() {
            let mut head = logger.head.lock().await;
            head.block_seq = last.block_seq + 1;
            head.last_hash = last.block_hash;
        }
        logger
    }

    /// Append one block. Write failures are logged, never propagated.
    pub async fn append(
        &self,
        event_type: AuditEventType,
        event_id: &str,
        owner_id: &str,
        payload: serde_json::Value,
    ) {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();

        // Held across the write so lines land in chain order
        let mut head = self.head.lock().await;
        let block = AuditBlock::seal(
            head.block_seq,
            timestamp_ms,
            event_id,
            owner_id,
            head.last_hash.clone(),
            event_type,
            payload.to_string(),
        );
        debug_assert!(block.verify(), "freshly sealed audit block must verify");

        let line = match serde_json::to_string(&block) {
            Ok(l) => format!("{l}\n"),
            Err(e) => {
                warn!("Audit: failed to serialize block: {e}");
                return;
            }
        };

        match OpenOptions::new().create(true).append(true).open(self.path.as_ref()).await {
            Ok(mut f) => {
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    warn!("Audit: write failed: {e}");
                    return;
                }
            }
            Err(e) => {
                warn!("Audit: could not open {}: {e}", self.path.display());
                return;
            }
        }

        debug!("Audit[{}]: {} {} {}", block.block_seq, block.event_type, event_id, block.block_hash);
        head.block_seq += 1;
        head.last_hash = block.block_hash;
    }
}
