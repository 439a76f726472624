use super::{ensure_parent_dir, storage_err};
use crate::domain::{Registration, RegistrationChanges, RegistrationView, identity_key};
use crate::ports::{RegistrationRepository, RegistrationSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{Error, Result};
use sled::{Db, Tree};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const REGISTRATIONS_TREE: &str = "registrations";
const BY_IDENTITY_TREE: &str = "by_identity";
const BY_RECENCY_TREE: &str = "by_recency";

/// Source of truth for registrations.
///
/// Three trees: records by id, a unique index by identity key, and a recency index whose
/// byte order is newest first with ties broken by ascending id.
pub struct SledRegistry {
    db: Db,
    registrations: Tree,
    by_identity: Tree,
    by_recency: Tree,
}

impl SledRegistry {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        ensure_parent_dir(path.as_ref())?;
        let db = sled::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open registry: {}", e)))?;
        Self::from_db(db)
    }

    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            registrations: db.open_tree(REGISTRATIONS_TREE).map_err(storage_err)?,
            by_identity: db.open_tree(BY_IDENTITY_TREE).map_err(storage_err)?,
            by_recency: db.open_tree(BY_RECENCY_TREE).map_err(storage_err)?,
            db,
        })
    }

    fn load(&self, id: Uuid) -> Result<Option<Registration>> {
        self.registrations
            .get(id.as_bytes())
            .map_err(storage_err)?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(Error::from))
            .transpose()
    }

    fn store(&self, registration: &Registration) -> Result<()> {
        self.registrations
            .insert(registration.id.as_bytes(), serde_json::to_vec(registration)?)
            .map_err(storage_err)?;
        Ok(())
    }

    /// Claims `identity` for `id`. Fails with `Conflict` when another record owns it.
    fn claim_identity(&self, identity: &str, id: Uuid) -> Result<()> {
        let claimed = self
            .by_identity
            .compare_and_swap(
                identity.as_bytes(),
                None::<&[u8]>,
                Some(id.as_bytes().to_vec()),
            )
            .map_err(storage_err)?;

        claimed.map_err(|_| Error::Conflict(format!("{identity} is already registered")))
    }

    fn release_identity(&self, identity: &str, id: Uuid) -> Result<()> {
        // Only drop the index entry while it still points at this record.
        let _ = self
            .by_identity
            .compare_and_swap(
                identity.as_bytes(),
                Some(id.as_bytes().as_slice()),
                None::<Vec<u8>>,
            )
            .map_err(storage_err)?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(storage_err)?;
        Ok(())
    }
}

fn recency_key(created_at: DateTime<Utc>, id: Uuid) -> Vec<u8> {
    let millis = created_at.timestamp_millis().max(0) as u64;
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&(u64::MAX - millis).to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

fn id_from(bytes: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(bytes).map_err(|e| Error::Storage(format!("corrupt index entry: {}", e)))
}

#[async_trait]
impl RegistrationSource for SledRegistry {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<RegistrationView>> {
        let mut records = Vec::with_capacity(limit);
        for item in self.by_recency.iter().skip(offset).take(limit) {
            let (_, id) = item.map_err(storage_err)?;
            // An index entry can briefly outlive its record during a delete.
            if let Some(registration) = self.load(id_from(&id)?)? {
                records.push(registration.view());
            }
        }
        Ok(records)
    }

    async fn count_all(&self) -> Result<u64> {
        Ok(self.registrations.len() as u64)
    }

    async fn find_by_identity(&self, identity: &str) -> Result<Option<RegistrationView>> {
        let Some(id) = self
            .by_identity
            .get(identity_key(identity).as_bytes())
            .map_err(storage_err)?
        else {
            return Ok(None);
        };
        Ok(self.load(id_from(&id)?)?.map(|r| r.view()))
    }
}

#[async_trait]
impl RegistrationRepository for SledRegistry {
    async fn insert(&self, registration: Registration) -> Result<Registration> {
        self.claim_identity(&registration.identity_key(), registration.id)?;
        self.store(&registration)?;
        self.by_recency
            .insert(
                recency_key(registration.created_at, registration.id),
                registration.id.as_bytes().to_vec(),
            )
            .map_err(storage_err)?;
        self.flush().await?;

        debug!(id = %registration.id, "registration committed");
        Ok(registration)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: RegistrationChanges,
    ) -> Result<(Registration, Option<String>)> {
        let mut registration = self.load(id)?.ok_or(Error::NotFound)?;
        let previous = registration.apply(changes);

        if let Some(old_identity) = &previous {
            self.claim_identity(&registration.identity_key(), id)?;
            self.release_identity(old_identity, id)?;
        }
        self.store(&registration)?;
        self.flush().await?;

        Ok((registration, previous))
    }

    async fn delete(&self, id: Uuid) -> Result<Registration> {
        let removed = self
            .registrations
            .remove(id.as_bytes())
            .map_err(storage_err)?
            .ok_or(Error::NotFound)?;
        let registration: Registration = serde_json::from_slice(&removed)?;

        self.release_identity(&registration.identity_key(), id)?;
        self.by_recency
            .remove(recency_key(registration.created_at, id))
            .map_err(storage_err)?;
        self.flush().await?;

        Ok(registration)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Registration>> {
        self.load(id)
    }
}
