//! User and group accounts
//!
//! Provisioning a user creates its owner-scoped entry table and the
//! root directory entry, so the first `save` against the account
//! always finds a resolvable parent. Credentials live in an external
//! auth backend and are not stored here.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use depot_common::{DepotError, Entry, EntryType, Group, User, utils::now_millis};
use depot_store::MetadataStore;

pub struct GroupService {
    metadata: Arc<dyn MetadataStore>,
}

impl GroupService {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    pub async fn create(&self, name: &str) -> Result<Group, DepotError> {
        let group = Group {
            id: self.metadata.next_id("group").await?,
            name: name.to_string(),
        };
        self.metadata.insert_group(&group).await?;
        info!(id = group.id, name = %group.name, "Created group");
        Ok(group)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Group>, DepotError> {
        self.metadata.group_by_id(id).await
    }
}

pub struct UserService {
    metadata: Arc<dyn MetadataStore>,
    groups: Arc<GroupService>,
}

impl UserService {
    pub fn new(metadata: Arc<dyn MetadataStore>, groups: Arc<GroupService>) -> Self {
        Self { metadata, groups }
    }

    /// Create the user, its entry table, and its root directory
    pub async fn create(&self, username: &str, groups: Vec<i64>) -> Result<User, DepotError> {
        self.check_groups(&groups).await?;

        let user = User {
            id: self.metadata.next_id("user").await?,
            username: username.to_string(),
            groups,
        };
        self.metadata.insert_user(&user).await?;
        self.metadata.create_owner_table(user.id).await?;
        self.insert_root_entry(&user).await?;

        info!(id = user.id, username = %user.username, "Provisioned user");
        Ok(user)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, DepotError> {
        self.metadata.user_by_id(id).await
    }

    async fn check_groups(&self, groups: &[i64]) -> Result<(), DepotError> {
        let mut missing = Vec::new();
        for id in groups {
            if self.groups.find_by_id(*id).await?.is_none() {
                missing.push(id.to_string());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DepotError::NotFound(format!("groups {}", missing.join(","))))
        }
    }

    async fn insert_root_entry(&self, user: &User) -> Result<(), DepotError> {
        let timestamp = now_millis();
        let root = Entry {
            uuid: Uuid::new_v4().to_string(),
            name: "/".to_string(),
            entry_type: EntryType::Directory,
            parent: None,
            children: Some(Vec::new()),
            path: "/".to_string(),
            owner: user.id,
            group: user.groups.first().copied().unwrap_or_default(),
            permission: "755".to_string(),
            share: None,
            created: timestamp,
            modified: timestamp,
            size: 0,
            locations: Vec::new(),
            location_path: format!("{}/", user.id),
        };
        self.metadata.insert_entry(user.id, &root).await
    }
}
