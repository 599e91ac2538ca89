//! Persistent counter store: record types and the repository port.
//!
//! Three logical collections back the limiter: per-identity counters
//! (read-modify-write), flagged identities (merge-upsert, one current flag
//! state per identity), and security events (append-only audit trail).
//! The `CounterStore` trait is the seam for a document-database backend;
//! `MemoryCounterStore` is the process-local default.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::GateError;

/// Counter record, one per `(identity, operation class)`.
///
/// `flagged_count` tracks repeated offense across windows and survives
/// window resets; only a manual review action clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub count: u32,
    pub amount: f64,
    pub first_attempt: u64,
    pub last_attempt: u64,
    pub flagged_count: u32,
}

/// Current flag state for an identity under manual review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedIdentity {
    pub identity: String,
    pub ip: String,
    pub flagged_at: u64,
    pub reason: String,
    pub operation: Option<String>,
    pub limit_triggered: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEventDetails {
    pub operation: String,
    pub count: u32,
    pub amount: f64,
    pub limit: u32,
    pub amount_limit: f64,
}

/// Append-only audit record; the review UI flips `reviewed`, never this
/// subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_id: String,
    pub user_id: String,
    pub ip: String,
    pub event_type: String,
    pub details: SecurityEventDetails,
    pub timestamp: u64,
    pub reviewed: bool,
}

/// Repository port for rate-limit persistence.
///
/// Counter access is whole-record read-modify-write: no partial-field
/// updates, no locks. Two racing checks on one key can drop an increment;
/// acceptable for abuse deterrence (approximate enforcement).
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<RateLimitRecord>, GateError>;

    async fn save(&self, key: &str, record: &RateLimitRecord) -> Result<(), GateError>;

    /// Merge-upsert: overwrites any prior flag state for the identity.
    async fn upsert_flag(&self, flag: &FlaggedIdentity) -> Result<(), GateError>;

    /// Appends to the audit trail; existing events are never touched.
    async fn append_event(&self, event: &SecurityEvent) -> Result<(), GateError>;
}

/// In-memory store backend.
///
/// Stale counters are not swept; they are overwritten on next use, so
/// growth is bounded by identities x operation classes.
pub struct MemoryCounterStore {
    counters: DashMap<String, RateLimitRecord>,
    flags: DashMap<String, FlaggedIdentity>,
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            flags: DashMap::new(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Current counter record for a key (inspection/monitoring).
    pub fn counter(&self, key: &str) -> Option<RateLimitRecord> {
        self.counters.get(key).map(|r| r.value().clone())
    }

    /// Current flag state for an identity key, if any.
    pub fn flag(&self, identity: &str) -> Option<FlaggedIdentity> {
        self.flags.get(identity).map(|f| f.value().clone())
    }

    /// Snapshot of the security-event log.
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn load(&self, key: &str) -> Result<Option<RateLimitRecord>, GateError> {
        Ok(self.counters.get(key).map(|r| r.value().clone()))
    }

    async fn save(&self, key: &str, record: &RateLimitRecord) -> Result<(), GateError> {
        self.counters.insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn upsert_flag(&self, flag: &FlaggedIdentity) -> Result<(), GateError> {
        self.flags.insert(flag.identity.clone(), flag.clone());
        Ok(())
    }

    async fn append_event(&self, event: &SecurityEvent) -> Result<(), GateError> {
        self.events
            .lock()
            .map_err(|_| GateError::StoreError("event log lock poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}
