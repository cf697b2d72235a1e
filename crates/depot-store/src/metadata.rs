//! Metadata store: owner-scoped entry tables and the cross-zone
//! node directory
//!
//! Entry tables are created lazily when an owner is provisioned and
//! keyed by entry uuid with a secondary path lookup. The location set
//! column supports the conditional remove-old/add-new batch the
//! replication state machine is built on.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use depot_common::{DepotError, Entry, Group, NodeIdentity, User};

/// Column-oriented metadata primitives
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create the owner-scoped entry table; idempotent
    async fn create_owner_table(&self, owner: i64) -> Result<(), DepotError>;

    async fn owner_table_exists(&self, owner: i64) -> Result<bool, DepotError>;

    async fn insert_entry(&self, owner: i64, entry: &Entry) -> Result<(), DepotError>;

    async fn entries(&self, owner: i64) -> Result<Vec<Entry>, DepotError>;

    async fn entry_by_uuid(&self, owner: i64, uuid: &str) -> Result<Option<Entry>, DepotError>;

    async fn entry_by_path(&self, owner: i64, path: &str) -> Result<Option<Entry>, DepotError>;

    async fn delete_by_uuid(&self, owner: i64, uuid: &str) -> Result<(), DepotError>;

    async fn delete_by_path(&self, owner: i64, path: &str) -> Result<(), DepotError>;

    /// Append `child` to the parent directory's child set
    async fn add_child(&self, owner: i64, parent: &str, child: &str) -> Result<(), DepotError>;

    /// Remove `child` from the parent directory's child set
    async fn remove_child(&self, owner: i64, parent: &str, child: &str) -> Result<(), DepotError>;

    /// Replace one encoded location string with another as an
    /// add-new/remove-old batch on the set column.
    ///
    /// The caller verifies the status precondition immediately before
    /// this call. Between the two steps of the batch an entry can
    /// transiently carry zero or two locations for the same node; this
    /// narrow window is a known property of the set-column encoding
    /// and is deliberately not papered over here.
    async fn swap_location(
        &self,
        owner: i64,
        uuid: &str,
        old: &str,
        new: &str,
    ) -> Result<(), DepotError>;

    /// Publish a node into the cross-zone directory with a row TTL
    async fn upsert_zone_node(&self, node: &NodeIdentity, ttl: Duration) -> Result<(), DepotError>;

    /// All unexpired rows of the cross-zone directory
    async fn zone_nodes(&self) -> Result<Vec<NodeIdentity>, DepotError>;

    /// Increment-and-get a named id sequence
    async fn next_id(&self, counter: &str) -> Result<i64, DepotError>;

    async fn insert_user(&self, user: &User) -> Result<(), DepotError>;

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, DepotError>;

    async fn insert_group(&self, group: &Group) -> Result<(), DepotError>;

    async fn group_by_id(&self, id: i64) -> Result<Option<Group>, DepotError>;
}

struct ZoneRow {
    node: NodeIdentity,
    stored_at: Instant,
    ttl: Duration,
}

impl ZoneRow {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// In-memory metadata store
pub struct MemoryMetadataStore {
    /// owner id -> (entry uuid -> entry)
    tables: Arc<DashMap<i64, DashMap<String, Entry>>>,
    /// (uid, zone) -> TTL'd directory row
    zone_rows: Arc<DashMap<(String, String), ZoneRow>>,
    counters: Arc<DashMap<String, i64>>,
    users: Arc<DashMap<i64, User>>,
    groups: Arc<DashMap<i64, Group>>,
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self {
            tables: Arc::new(DashMap::new()),
            zone_rows: Arc::new(DashMap::new()),
            counters: Arc::new(DashMap::new()),
            users: Arc::new(DashMap::new()),
            groups: Arc::new(DashMap::new()),
        }
    }
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(
        &self,
        owner: i64,
    ) -> Result<dashmap::mapref::one::Ref<'_, i64, DashMap<String, Entry>>, DepotError> {
        self.tables
            .get(&owner)
            .ok_or_else(|| DepotError::Store(format!("entry table for owner {} does not exist", owner)))
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn create_owner_table(&self, owner: i64) -> Result<(), DepotError> {
        self.tables.entry(owner).or_default();
        Ok(())
    }

    async fn owner_table_exists(&self, owner: i64) -> Result<bool, DepotError> {
        Ok(self.tables.contains_key(&owner))
    }

    async fn insert_entry(&self, owner: i64, entry: &Entry) -> Result<(), DepotError> {
        self.table(owner)?
            .insert(entry.uuid.clone(), entry.clone());
        Ok(())
    }

    async fn entries(&self, owner: i64) -> Result<Vec<Entry>, DepotError> {
        Ok(self
            .table(owner)?
            .iter()
            .map(|row| row.value().clone())
            .collect())
    }

    async fn entry_by_uuid(&self, owner: i64, uuid: &str) -> Result<Option<Entry>, DepotError> {
        Ok(self.table(owner)?.get(uuid).map(|row| row.value().clone()))
    }

    async fn entry_by_path(&self, owner: i64, path: &str) -> Result<Option<Entry>, DepotError> {
        Ok(self
            .table(owner)?
            .iter()
            .find(|row| row.value().path == path)
            .map(|row| row.value().clone()))
    }

    async fn delete_by_uuid(&self, owner: i64, uuid: &str) -> Result<(), DepotError> {
        self.table(owner)?.remove(uuid);
        Ok(())
    }

    async fn delete_by_path(&self, owner: i64, path: &str) -> Result<(), DepotError> {
        let table = self.table(owner)?;
        let uuid = table
            .iter()
            .find(|row| row.value().path == path)
            .map(|row| row.key().clone());
        if let Some(uuid) = uuid {
            table.remove(&uuid);
        }
        Ok(())
    }

    async fn add_child(&self, owner: i64, parent: &str, child: &str) -> Result<(), DepotError> {
        if let Some(mut row) = self.table(owner)?.get_mut(parent)
            && let Some(children) = row.children.as_mut()
            && !children.iter().any(|existing| existing == child)
        {
            children.push(child.to_string());
        }
        Ok(())
    }

    async fn remove_child(&self, owner: i64, parent: &str, child: &str) -> Result<(), DepotError> {
        if let Some(mut row) = self.table(owner)?.get_mut(parent)
            && let Some(children) = row.children.as_mut()
        {
            children.retain(|existing| existing != child);
        }
        Ok(())
    }

    async fn swap_location(
        &self,
        owner: i64,
        uuid: &str,
        old: &str,
        new: &str,
    ) -> Result<(), DepotError> {
        if let Some(mut row) = self.table(owner)?.get_mut(uuid) {
            // Batch order matches the original: add first, then remove
            if !row.locations.iter().any(|existing| existing == new) {
                row.locations.push(new.to_string());
            }
            row.locations.retain(|existing| existing != old);
        }
        Ok(())
    }

    async fn upsert_zone_node(&self, node: &NodeIdentity, ttl: Duration) -> Result<(), DepotError> {
        self.zone_rows.insert(
            (node.uid.clone(), node.zone.clone()),
            ZoneRow {
                node: node.clone(),
                stored_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn zone_nodes(&self) -> Result<Vec<NodeIdentity>, DepotError> {
        Ok(self
            .zone_rows
            .iter()
            .filter(|row| !row.value().is_expired())
            .map(|row| row.value().node.clone())
            .collect())
    }

    async fn next_id(&self, counter: &str) -> Result<i64, DepotError> {
        let mut value = self.counters.entry(counter.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn insert_user(&self, user: &User) -> Result<(), DepotError> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, DepotError> {
        Ok(self.users.get(&id).map(|row| row.value().clone()))
    }

    async fn insert_group(&self, group: &Group) -> Result<(), DepotError> {
        self.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn group_by_id(&self, id: i64) -> Result<Option<Group>, DepotError> {
        Ok(self.groups.get(&id).map(|row| row.value().clone()))
    }
}
