use super::{ensure_parent_dir, storage_err};
use crate::events::{DeadLetter, Delivery, EventEnvelope, RegistrationEvent};
use crate::ports::EventLog;
use async_trait::async_trait;
use chrono::Utc;
use shared::{Error, Result};
use sled::{Db, Tree};
use std::path::Path;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

const EVENTS_TREE: &str = "events";
const CURSORS_TREE: &str = "cursors";
const ATTEMPTS_TREE: &str = "attempts";
const DEAD_LETTERS_TREE: &str = "dead_letters";

/// Sled-backed append-only event log with per-group cursors, attempt counts and dead letters.
///
/// Sequence numbers are assigned under a mutex so the keyspace order is the commit order.
pub struct SledEventLog {
    db: Db,
    events: Tree,
    cursors: Tree,
    attempts: Tree,
    dead_letters: Tree,
    append_lock: Mutex<()>,
    appended: Notify,
}

impl SledEventLog {
    /// Open (or create) the log at `path`, creating the parent directory if needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        ensure_parent_dir(path.as_ref())?;
        let db = sled::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open event log: {}", e)))?;
        Self::from_db(db)
    }

    /// A throwaway log that disappears when dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            events: db.open_tree(EVENTS_TREE).map_err(storage_err)?,
            cursors: db.open_tree(CURSORS_TREE).map_err(storage_err)?,
            attempts: db.open_tree(ATTEMPTS_TREE).map_err(storage_err)?,
            dead_letters: db.open_tree(DEAD_LETTERS_TREE).map_err(storage_err)?,
            db,
            append_lock: Mutex::new(()),
            appended: Notify::new(),
        })
    }

    fn cursor(&self, group: &str) -> Result<Option<u64>> {
        Ok(self
            .cursors
            .get(group.as_bytes())
            .map_err(storage_err)?
            .map(|v| decode_u64(&v)))
    }

    fn attempts_for(&self, group: &str, seq: u64) -> Result<u32> {
        Ok(self
            .attempts
            .get(group_key(group, seq))
            .map_err(storage_err)?
            .map(|v| decode_u32(&v))
            .unwrap_or(0))
    }
}

#[async_trait]
impl EventLog for SledEventLog {
    async fn append(&self, event: &RegistrationEvent) -> Result<u64> {
        let _guard = self.append_lock.lock().await;

        let seq = self.db.generate_id().map_err(storage_err)? + 1;
        let envelope = EventEnvelope {
            seq,
            partition_key: event.identity_key().to_string(),
            appended_at: Utc::now(),
            event: event.clone(),
        };
        let payload = serde_json::to_vec(&envelope)?;

        self.events
            .insert(seq.to_be_bytes(), payload)
            .map_err(storage_err)?;
        self.db.flush_async().await.map_err(storage_err)?;

        self.appended.notify_waiters();
        Ok(seq)
    }

    async fn read_from(&self, group: &str, max: usize) -> Result<Vec<Delivery>> {
        let start = self.cursor(group)?.map(|c| c + 1).unwrap_or(0);

        let mut deliveries = Vec::new();
        for item in self.events.range(start.to_be_bytes()..).take(max) {
            let (key, payload) = item.map_err(storage_err)?;
            let seq = decode_u64(&key);
            deliveries.push(Delivery {
                seq,
                attempts: self.attempts_for(group, seq)?,
                payload: payload.to_vec(),
            });
        }
        Ok(deliveries)
    }

    async fn ack(&self, group: &str, seq: u64) -> Result<()> {
        // Cursors only move forward, a late ack for an older seq leaves them alone.
        self.cursors
            .update_and_fetch(group.as_bytes(), |old| {
                let current = old.map(decode_u64);
                let next = current.map_or(seq, |c| c.max(seq));
                Some(next.to_be_bytes().to_vec())
            })
            .map_err(storage_err)?;
        self.attempts
            .remove(group_key(group, seq))
            .map_err(storage_err)?;
        Ok(())
    }

    async fn record_failure(&self, group: &str, seq: u64) -> Result<u32> {
        let updated = self
            .attempts
            .update_and_fetch(group_key(group, seq), |old| {
                let attempts = old.map(decode_u32).unwrap_or(0);
                Some(attempts.saturating_add(1).to_be_bytes().to_vec())
            })
            .map_err(storage_err)?;
        Ok(updated.map(|v| decode_u32(&v)).unwrap_or(1))
    }

    async fn dead_letter(&self, group: &str, delivery: &Delivery, reason: &str) -> Result<()> {
        let letter = DeadLetter {
            seq: delivery.seq,
            group: group.to_string(),
            attempts: delivery.attempts,
            reason: reason.to_string(),
            payload: String::from_utf8_lossy(&delivery.payload).into_owned(),
            dead_lettered_at: Utc::now(),
        };
        self.dead_letters
            .insert(group_key(group, delivery.seq), serde_json::to_vec(&letter)?)
            .map_err(storage_err)?;
        self.ack(group, delivery.seq).await
    }

    async fn dead_letters(&self, group: &str) -> Result<Vec<DeadLetter>> {
        let prefix = format!("{group}:");
        let mut letters = Vec::new();
        for item in self.dead_letters.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item.map_err(storage_err)?;
            letters.push(serde_json::from_slice(&value)?);
        }
        Ok(letters)
    }

    async fn wait_for_append(&self, max_wait: Duration) {
        let _ = tokio::time::timeout(max_wait, self.appended.notified()).await;
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(storage_err)?;
        Ok(())
    }
}

fn group_key(group: &str, seq: u64) -> Vec<u8> {
    format!("{group}:{seq:020}").into_bytes()
}

fn decode_u64(bytes: &[u8]) -> u64 {
    <[u8; 8]>::try_from(bytes).map(u64::from_be_bytes).unwrap_or(0)
}

fn decode_u32(bytes: &[u8]) -> u32 {
    <[u8; 4]>::try_from(bytes).map(u32::from_be_bytes).unwrap_or(0)
}
