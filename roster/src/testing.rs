//! In-process doubles for the ports, used by the unit tests in this crate.

use crate::domain::{RegistrationView, identity_key};
use crate::ports::{KeyValueStore, RegistrationSource};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use shared::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Default)]
pub struct FakeStore {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    unavailable: AtomicBool,
    failing_adjusts: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Makes the next `n` adjust calls fail as if the store timed out.
    pub fn fail_next_adjusts(&self, n: usize) {
        self.failing_adjusts.store(n, Ordering::SeqCst);
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone())
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::Storage("store unreachable".into()))
        } else {
            Ok(())
        }
    }

    fn live(entries: &mut HashMap<String, (Vec<u8>, Instant)>, key: &str) -> bool {
        match entries.get(key) {
            Some((_, expires)) if *expires > Instant::now() => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }
}

#[async_trait]
impl KeyValueStore for FakeStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.check()?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        if Self::live(&mut entries, key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        if Self::live(&mut entries, key) && entries[key].0 == expected {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn adjust(&self, key: &str, delta: i64, ttl: Duration) -> Result<Option<i64>> {
        self.check()?;
        if self
            .failing_adjusts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Timeout("adjust".into()));
        }
        let mut entries = self.entries.lock().unwrap();
        if !Self::live(&mut entries, key) {
            return Ok(None);
        }
        let current: i64 = String::from_utf8_lossy(&entries[key].0)
            .parse()
            .map_err(|_| Error::Serialization(format!("{key} is not an integer")))?;
        let next = (current + delta).max(0);
        entries.insert(
            key.to_string(),
            (next.to_string().into_bytes(), Instant::now() + ttl),
        );
        Ok(Some(next))
    }
}

/// Source of truth double that counts how often it is hit.
pub struct CountingSource {
    records: RwLock<Vec<RegistrationView>>,
    delay: Duration,
    pub fetch_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
}

impl CountingSource {
    pub fn new(records: Vec<RegistrationView>, delay: Duration) -> Self {
        Self {
            records: RwLock::new(records),
            delay,
            fetch_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
        }
    }

    /// Inserts at the front, matching newest-first ordering.
    pub fn push_newest(&self, record: RegistrationView) {
        self.records.write().unwrap().insert(0, record);
    }

    pub fn remove(&self, id: Uuid) {
        self.records.write().unwrap().retain(|r| r.id != id);
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrationSource for CountingSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<RegistrationView>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let records = self.records.read().unwrap();
        Ok(records.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn count_all(&self) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.records.read().unwrap().len() as u64)
    }

    async fn find_by_identity(&self, key: &str) -> Result<Option<RegistrationView>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let records = self.records.read().unwrap();
        Ok(records.iter().find(|r| identity_key(&r.email) == key).cloned())
    }
}

/// Builds `n` views already in newest-first order.
pub fn views(n: usize) -> Vec<RegistrationView> {
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    (0..n)
        .map(|i| RegistrationView {
            id: Uuid::new_v4(),
            email: format!("attendee{i}@example.com"),
            full_name: format!("Attendee {i}"),
            company: None,
            ticket_type: "general".into(),
            created_at: base - ChronoDuration::minutes(i as i64),
        })
        .collect()
}

pub fn fast_settings() -> shared::config::CacheSettings {
    shared::config::CacheSettings {
        lock_retry_attempts: 8,
        lock_backoff_base: Duration::from_millis(10),
        lock_backoff_max: Duration::from_millis(80),
        count_retry_attempts: 8,
        redelivery_backoff: Duration::from_millis(5),
        consumer_poll_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

/// A full record matching `view`, for building events in tests.
pub fn registration_from(view: &RegistrationView) -> crate::domain::Registration {
    crate::domain::Registration {
        id: view.id,
        email: view.email.clone(),
        full_name: view.full_name.clone(),
        company: view.company.clone(),
        ticket_type: view.ticket_type.clone(),
        confirmation_token: "test-token".into(),
        internal_notes: None,
        created_at: view.created_at,
        updated_at: view.created_at,
    }
}
