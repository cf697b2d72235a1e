//! Entry metadata lifecycle
//!
//! One interface, two sides. The leader implementation validates and
//! persists entries and announces them; the follower implementation
//! only reads. Which one a node wires up is decided by its current
//! role.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use depot_common::{
    DepotError, ENTRY_CHANNEL, Entry, EntryType, EventOperation, FILE_CHANNEL, Location,
    LocationStatus, NodeIdentity, ReplicationEvent, utils::now_millis,
};
use depot_registry::RegistryService;
use depot_store::{EventBus, MetadataStore};

use crate::account::{GroupService, UserService};

/// Attributes of an entry to create
#[derive(Clone, Debug)]
pub struct EntryRequest {
    pub name: String,
    pub entry_type: EntryType,
    /// Full logical path, e.g. `/docs/a.txt`
    pub path: String,
    pub group: i64,
    pub permission: String,
    pub share: Option<String>,
    pub size: i64,
    /// Candidate replica node uids
    pub locations: Vec<String>,
}

#[async_trait]
pub trait EntryService: Send + Sync {
    async fn entries(&self, owner: i64) -> Result<Vec<Entry>, DepotError>;

    async fn entry_by_uuid(&self, owner: i64, uuid: &str) -> Result<Entry, DepotError>;

    async fn entry_by_path(&self, owner: i64, path: &str) -> Result<Entry, DepotError>;

    async fn save(&self, owner: i64, request: EntryRequest) -> Result<Entry, DepotError>;

    async fn delete_by_uuid(&self, owner: i64, uuid: &str) -> Result<(), DepotError>;

    async fn delete_by_path(&self, owner: i64, path: &str) -> Result<(), DepotError>;
}

/// Parent path of a logical path; `/docs/a.txt` -> `/docs`, `/docs` -> `/`
fn parent_path(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

/// Physical relative path under the store root, duplicate slashes
/// collapsed: owner 42 + `/docs/a.txt` -> `42/docs/a.txt`
fn location_path(owner: i64, path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        format!("{}/", owner)
    } else {
        format!("{}/{}", owner, segments.join("/"))
    }
}

async fn read_entry_by_uuid(
    metadata: &Arc<dyn MetadataStore>,
    owner: i64,
    uuid: &str,
) -> Result<Entry, DepotError> {
    metadata
        .entry_by_uuid(owner, uuid)
        .await?
        .ok_or_else(|| DepotError::NotFound(format!("entry {}", uuid)))
}

async fn read_entry_by_path(
    metadata: &Arc<dyn MetadataStore>,
    owner: i64,
    path: &str,
) -> Result<Entry, DepotError> {
    metadata
        .entry_by_path(owner, path)
        .await?
        .ok_or_else(|| DepotError::NotFound(format!("entry at {}", path)))
}

/// Leader-side entry service: full create/delete plus reads
pub struct MasterEntryService {
    node: NodeIdentity,
    metadata: Arc<dyn MetadataStore>,
    registry: Arc<RegistryService>,
    users: Arc<UserService>,
    groups: Arc<GroupService>,
    bus: EventBus,
}

impl MasterEntryService {
    pub fn new(
        node: NodeIdentity,
        metadata: Arc<dyn MetadataStore>,
        registry: Arc<RegistryService>,
        users: Arc<UserService>,
        groups: Arc<GroupService>,
        bus: EventBus,
    ) -> Self {
        Self {
            node,
            metadata,
            registry,
            users,
            groups,
            bus,
        }
    }

    /// Candidate uids with no live registration, empty when all are up
    async fn unavailable_nodes(&self, uids: &[String]) -> Result<Vec<String>, DepotError> {
        let alive: Vec<String> = self
            .registry
            .local_nodes()
            .await?
            .into_iter()
            .map(|node| node.uid)
            .collect();
        Ok(uids
            .iter()
            .filter(|uid| !alive.contains(uid))
            .cloned()
            .collect())
    }

    fn initial_locations(&self, request: &EntryRequest) -> Vec<String> {
        request
            .locations
            .iter()
            .map(|uid| {
                let status = match request.entry_type {
                    EntryType::Directory => LocationStatus::Exists,
                    EntryType::File if uid == &self.node.uid => LocationStatus::Reserved,
                    EntryType::File => LocationStatus::Created,
                };
                Location::new(uid.clone(), status).encode()
            })
            .collect()
    }

    async fn detach_and_announce_delete(&self, entry: &Entry) -> Result<(), DepotError> {
        if let Some(parent) = &entry.parent {
            self.metadata
                .remove_child(entry.owner, parent, &entry.uuid)
                .await?;
        }
        if !entry.is_directory() {
            self.bus.publish(
                FILE_CHANNEL,
                ReplicationEvent {
                    uuid: entry.uuid.clone(),
                    owner: entry.owner,
                    location_path: entry.location_path.clone(),
                    locations: entry.locations.clone(),
                    origin: self.node.clone(),
                    operation: EventOperation::Delete,
                },
            );
        }
        info!(owner = entry.owner, uuid = %entry.uuid, path = %entry.path, "Deleted entry");
        Ok(())
    }
}

#[async_trait]
impl EntryService for MasterEntryService {
    async fn entries(&self, owner: i64) -> Result<Vec<Entry>, DepotError> {
        self.metadata.entries(owner).await
    }

    async fn entry_by_uuid(&self, owner: i64, uuid: &str) -> Result<Entry, DepotError> {
        read_entry_by_uuid(&self.metadata, owner, uuid).await
    }

    async fn entry_by_path(&self, owner: i64, path: &str) -> Result<Entry, DepotError> {
        read_entry_by_path(&self.metadata, owner, path).await
    }

    async fn save(&self, owner: i64, request: EntryRequest) -> Result<Entry, DepotError> {
        if self.users.find_by_id(owner).await?.is_none() {
            return Err(DepotError::NotFound(format!("user {}", owner)));
        }
        if self.groups.find_by_id(request.group).await?.is_none() {
            return Err(DepotError::NotFound(format!("group {}", request.group)));
        }

        let unavailable = self.unavailable_nodes(&request.locations).await?;
        if !unavailable.is_empty() {
            return Err(DepotError::NodeUnavailable(unavailable));
        }

        let parent = read_entry_by_path(&self.metadata, owner, parent_path(&request.path))
            .await
            .map_err(|_| DepotError::ParentPathMissing)?;

        if self.metadata.entry_by_path(owner, &request.path).await?.is_some() {
            return Err(DepotError::Conflict(format!(
                "entry at {} already exists",
                request.path
            )));
        }

        let timestamp = now_millis();
        let entry = Entry {
            uuid: Uuid::new_v4().to_string(),
            name: request.name.clone(),
            entry_type: request.entry_type,
            parent: Some(parent.uuid.clone()),
            children: match request.entry_type {
                EntryType::Directory => Some(Vec::new()),
                EntryType::File => None,
            },
            path: request.path.clone(),
            owner,
            group: request.group,
            permission: request.permission.clone(),
            share: request.share.clone(),
            created: timestamp,
            modified: timestamp,
            size: request.size,
            locations: self.initial_locations(&request),
            location_path: location_path(owner, &request.path),
        };

        self.metadata.insert_entry(owner, &entry).await?;
        self.metadata
            .add_child(owner, &parent.uuid, &entry.uuid)
            .await?;

        // Directories are born Exists everywhere; only files need the
        // replicas to claim and pull
        if !entry.is_directory() {
            self.bus.publish(
                ENTRY_CHANNEL,
                ReplicationEvent {
                    uuid: entry.uuid.clone(),
                    owner,
                    location_path: entry.location_path.clone(),
                    locations: entry.locations.clone(),
                    origin: self.node.clone(),
                    operation: EventOperation::Save,
                },
            );
        }

        info!(owner, uuid = %entry.uuid, path = %entry.path, "Created entry");
        Ok(entry)
    }

    async fn delete_by_uuid(&self, owner: i64, uuid: &str) -> Result<(), DepotError> {
        let entry = read_entry_by_uuid(&self.metadata, owner, uuid).await?;
        self.metadata.delete_by_uuid(owner, uuid).await?;
        self.detach_and_announce_delete(&entry).await
    }

    async fn delete_by_path(&self, owner: i64, path: &str) -> Result<(), DepotError> {
        let entry = read_entry_by_path(&self.metadata, owner, path).await?;
        self.metadata.delete_by_path(owner, path).await?;
        self.detach_and_announce_delete(&entry).await
    }
}

/// Follower-side entry service: reads only, writes are redirected to
/// the zone leader by the caller
pub struct NodeEntryService {
    metadata: Arc<dyn MetadataStore>,
}

impl NodeEntryService {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl EntryService for NodeEntryService {
    async fn entries(&self, owner: i64) -> Result<Vec<Entry>, DepotError> {
        self.metadata.entries(owner).await
    }

    async fn entry_by_uuid(&self, owner: i64, uuid: &str) -> Result<Entry, DepotError> {
        read_entry_by_uuid(&self.metadata, owner, uuid).await
    }

    async fn entry_by_path(&self, owner: i64, path: &str) -> Result<Entry, DepotError> {
        read_entry_by_path(&self.metadata, owner, path).await
    }

    async fn save(&self, _owner: i64, _request: EntryRequest) -> Result<Entry, DepotError> {
        Err(DepotError::Conflict(
            "entry writes are accepted by the zone leader only".to_string(),
        ))
    }

    async fn delete_by_uuid(&self, _owner: i64, _uuid: &str) -> Result<(), DepotError> {
        Err(DepotError::Conflict(
            "entry writes are accepted by the zone leader only".to_string(),
        ))
    }

    async fn delete_by_path(&self, _owner: i64, _path: &str) -> Result<(), DepotError> {
        Err(DepotError::Conflict(
            "entry writes are accepted by the zone leader only".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_common::NodeRole;
    use depot_registry::RegistryTiming;
    use depot_store::{LeaseStore, MemoryLeaseStore, MemoryMetadataStore};

    struct Fixture {
        service: MasterEntryService,
        metadata: Arc<dyn MetadataStore>,
        registry: Arc<RegistryService>,
        bus: EventBus,
        owner: i64,
    }

    fn test_node(uid: &str) -> NodeIdentity {
        NodeIdentity {
            uid: uid.to_string(),
            address: "10.0.0.1".to_string(),
            port: 8080,
            protocol: "http".to_string(),
            zone: "alpha".to_string(),
            role: NodeRole::Leader,
        }
    }

    async fn fixture() -> Fixture {
        let lease: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::default());
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let registry = Arc::new(RegistryService::with_timing(
            lease,
            metadata.clone(),
            RegistryTiming::default(),
        ));
        let bus = EventBus::new();

        for uid in ["m1", "f1"] {
            registry.register_node(&test_node(uid)).await.unwrap();
            registry.refresh_alive(uid).await.unwrap();
        }

        let groups = Arc::new(GroupService::new(metadata.clone()));
        let users = Arc::new(UserService::new(metadata.clone(), groups.clone()));
        let group = groups.create("staff").await.unwrap();
        let user = users.create("u1", vec![group.id]).await.unwrap();

        Fixture {
            service: MasterEntryService::new(
                test_node("m1"),
                metadata.clone(),
                registry.clone(),
                users,
                groups,
                bus.clone(),
            ),
            metadata,
            registry,
            bus,
            owner: user.id,
        }
    }

    fn dir_request(path: &str) -> EntryRequest {
        EntryRequest {
            name: path.rsplit('/').next().unwrap_or("/").to_string(),
            entry_type: EntryType::Directory,
            path: path.to_string(),
            group: 1,
            permission: "755".to_string(),
            share: None,
            size: 0,
            locations: vec!["m1".to_string(), "f1".to_string()],
        }
    }

    fn file_request(path: &str) -> EntryRequest {
        EntryRequest {
            name: path.rsplit('/').next().unwrap().to_string(),
            entry_type: EntryType::File,
            path: path.to_string(),
            group: 1,
            permission: "644".to_string(),
            share: None,
            size: 0,
            locations: vec!["m1".to_string(), "f1".to_string()],
        }
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/docs/a.txt"), "/docs");
        assert_eq!(parent_path("/docs"), "/");
        assert_eq!(parent_path("/docs/sub/"), "/docs");
    }

    #[test]
    fn test_location_path_collapses_slashes() {
        assert_eq!(location_path(42, "/docs//a.txt"), "42/docs/a.txt");
        assert_eq!(location_path(42, "/"), "42/");
    }

    #[tokio::test]
    async fn test_save_directory_all_exists() {
        let fx = fixture().await;
        let entry = fx.service.save(fx.owner, dir_request("/docs")).await.unwrap();

        assert!(entry.is_directory());
        assert_eq!(entry.location_for("m1").unwrap().status, LocationStatus::Exists);
        assert_eq!(entry.location_for("f1").unwrap().status, LocationStatus::Exists);
    }

    #[tokio::test]
    async fn test_save_file_origin_reserved_rest_created() {
        let fx = fixture().await;
        fx.service.save(fx.owner, dir_request("/docs")).await.unwrap();
        let entry = fx
            .service
            .save(fx.owner, file_request("/docs/a.txt"))
            .await
            .unwrap();

        assert_eq!(entry.location_for("m1").unwrap().status, LocationStatus::Reserved);
        assert_eq!(entry.location_for("f1").unwrap().status, LocationStatus::Created);
        assert_eq!(entry.location_path, format!("{}/docs/a.txt", fx.owner));
    }

    #[tokio::test]
    async fn test_save_publishes_for_files_only() {
        let fx = fixture().await;
        let mut receiver = fx.bus.subscribe(ENTRY_CHANNEL);

        fx.service.save(fx.owner, dir_request("/docs")).await.unwrap();
        assert!(receiver.try_recv().is_err());

        let entry = fx
            .service
            .save(fx.owner, file_request("/docs/a.txt"))
            .await
            .unwrap();
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.uuid, entry.uuid);
        assert_eq!(event.operation, EventOperation::Save);
        assert_eq!(event.origin.uid, "m1");
    }

    #[tokio::test]
    async fn test_save_updates_parent_children() {
        let fx = fixture().await;
        let docs = fx.service.save(fx.owner, dir_request("/docs")).await.unwrap();
        let file = fx
            .service
            .save(fx.owner, file_request("/docs/a.txt"))
            .await
            .unwrap();

        assert_eq!(file.parent.as_deref(), Some(docs.uuid.as_str()));
        let docs = fx.service.entry_by_uuid(fx.owner, &docs.uuid).await.unwrap();
        assert_eq!(docs.children.as_deref(), Some(&[file.uuid][..]));
    }

    #[tokio::test]
    async fn test_save_unknown_owner() {
        let fx = fixture().await;
        let err = fx.service.save(999, dir_request("/docs")).await.unwrap_err();
        assert!(matches!(err, DepotError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_save_unknown_group() {
        let fx = fixture().await;
        let mut request = dir_request("/docs");
        request.group = 99;
        let err = fx.service.save(fx.owner, request).await.unwrap_err();
        assert!(matches!(err, DepotError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_save_dead_candidate_fails_atomically() {
        let fx = fixture().await;
        let mut request = file_request("/a.txt");
        request.locations.push("ghost".to_string());

        let err = fx.service.save(fx.owner, request).await.unwrap_err();
        match err {
            DepotError::NodeUnavailable(uids) => assert_eq!(uids, vec!["ghost"]),
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was persisted
        assert!(
            fx.metadata
                .entry_by_path(fx.owner, "/a.txt")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_save_missing_parent_path() {
        let fx = fixture().await;
        let err = fx
            .service
            .save(fx.owner, file_request("/docs/a.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, DepotError::ParentPathMissing));
    }

    #[tokio::test]
    async fn test_save_duplicate_path_conflicts() {
        let fx = fixture().await;
        fx.service.save(fx.owner, dir_request("/docs")).await.unwrap();
        let err = fx
            .service
            .save(fx.owner, dir_request("/docs"))
            .await
            .unwrap_err();
        assert!(matches!(err, DepotError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_detaches_and_announces() {
        let fx = fixture().await;
        let mut receiver = fx.bus.subscribe(FILE_CHANNEL);

        let docs = fx.service.save(fx.owner, dir_request("/docs")).await.unwrap();
        let file = fx
            .service
            .save(fx.owner, file_request("/docs/a.txt"))
            .await
            .unwrap();

        fx.service.delete_by_uuid(fx.owner, &file.uuid).await.unwrap();
        assert!(fx.service.entry_by_uuid(fx.owner, &file.uuid).await.is_err());

        let docs = fx.service.entry_by_uuid(fx.owner, &docs.uuid).await.unwrap();
        assert!(docs.children.as_deref().unwrap_or_default().is_empty());

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.operation, EventOperation::Delete);
        assert_eq!(event.uuid, file.uuid);
    }

    #[tokio::test]
    async fn test_delete_by_path_unknown_is_not_found() {
        let fx = fixture().await;
        let err = fx.service.delete_by_path(fx.owner, "/ghost").await.unwrap_err();
        assert!(matches!(err, DepotError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_node_service_rejects_writes() {
        let fx = fixture().await;
        let node_side = NodeEntryService::new(fx.metadata.clone());

        assert!(node_side.entries(fx.owner).await.is_ok());
        assert!(matches!(
            node_side.save(fx.owner, dir_request("/docs")).await,
            Err(DepotError::Conflict(_))
        ));
        assert!(matches!(
            node_side.delete_by_path(fx.owner, "/docs").await,
            Err(DepotError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_backed_alive_filter_uses_lease() {
        let fx = fixture().await;
        // f1 goes dark: GC removes it from the map after its lease lapses
        fx.registry
            .deregister_node("f1")
            .await
            .unwrap();

        let err = fx.service.save(fx.owner, dir_request("/docs")).await.unwrap_err();
        assert!(matches!(err, DepotError::NodeUnavailable(_)));
    }
}
