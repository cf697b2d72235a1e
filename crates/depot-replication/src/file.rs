//! Content storage and node-to-node transfer
//!
//! Every node stores file bytes under a root directory at a path
//! derived from the entry's `location_path`. Replica progress is a
//! single conditional transition on the entry's location set: read the
//! current status for this node, and only when it matches the expected
//! prior state replace the encoded string. The replacement runs as an
//! add-then-remove batch on the set column, so between the two steps a
//! reader can transiently see zero or two entries for the same node;
//! a clean fix needs a status map keyed by node instead of an encoded
//! string set, which is an accepted follow-up, not something this
//! module papers over.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use depot_common::{
    DepotError, ENTRY_CHANNEL, Entry, EventOperation, FILE_CHANNEL, Location, LocationStatus,
    NodeIdentity, ReplicationEvent,
};
use depot_store::{EventBus, MetadataStore};

/// Disk layout and replica-status transitions shared by both sides of
/// a transfer
pub struct FileStore {
    root: PathBuf,
    node_uid: String,
    metadata: Arc<dyn MetadataStore>,
}

impl FileStore {
    pub fn new(
        root: impl Into<PathBuf>,
        node_uid: impl Into<String>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            root: root.into(),
            node_uid: node_uid.into(),
            metadata,
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn temp_path(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Create the root and temp directories
    pub async fn init(&self) -> Result<(), DepotError> {
        tokio::fs::create_dir_all(self.root_path()).await?;
        tokio::fs::create_dir_all(self.temp_path()).await?;
        Ok(())
    }

    /// Absolute on-disk path for a physical relative path
    pub fn absolute_path(&self, location_path: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in location_path.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    /// Create the intermediate directories for a physical path
    pub async fn ensure_parent_dir(&self, location_path: &str) -> Result<(), DepotError> {
        if let Some(parent) = self.absolute_path(location_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// On-disk path of an entry's content, for serving peer pulls
    pub async fn content_path(&self, owner: i64, uuid: &str) -> Result<PathBuf, DepotError> {
        let entry = self.entry(owner, uuid).await?;
        Ok(self.absolute_path(&entry.location_path))
    }

    pub async fn entry(&self, owner: i64, uuid: &str) -> Result<Entry, DepotError> {
        self.metadata
            .entry_by_uuid(owner, uuid)
            .await?
            .ok_or_else(|| DepotError::NotFound(format!("entry {}", uuid)))
    }

    /// Conditionally advance this node's replica status.
    ///
    /// Reads the entry's current location set; the swap is applied only
    /// when this node's status equals `from`. Returns whether it was
    /// applied, so stale or duplicated events degrade to a no-op.
    pub async fn update_location_status(
        &self,
        owner: i64,
        uuid: &str,
        from: LocationStatus,
        to: LocationStatus,
    ) -> Result<bool, DepotError> {
        let Some(entry) = self.metadata.entry_by_uuid(owner, uuid).await? else {
            return Ok(false);
        };
        let Some(location) = entry.location_for(&self.node_uid) else {
            return Ok(false);
        };
        if location.status != from {
            return Ok(false);
        }

        let next = Location::new(self.node_uid.clone(), to);
        self.metadata
            .swap_location(owner, uuid, &location.encode(), &next.encode())
            .await?;
        debug!(owner, uuid, from = ?from, to = ?to, "Advanced replica status");
        Ok(true)
    }
}

/// Fetches entry content from an origin node into a local file
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(
        &self,
        origin: &NodeIdentity,
        owner: i64,
        uuid: &str,
        dest: &Path,
    ) -> Result<u64, DepotError>;
}

/// Production fetcher: `GET {origin}/upload/{owner}/{uuid}`, redirects
/// followed, body streamed to disk
pub struct HttpContentFetcher {
    client: reqwest::Client,
}

impl Default for HttpContentFetcher {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl HttpContentFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(
        &self,
        origin: &NodeIdentity,
        owner: i64,
        uuid: &str,
        dest: &Path,
    ) -> Result<u64, DepotError> {
        let url = format!("{}/upload/{}/{}", origin.base_url(), owner, uuid);
        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| DepotError::TransferFailure(format!("GET {}: {}", url, e)))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DepotError::TransferFailure(format!("GET {}: {}", url, e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Leader-side content service: accepts the client upload and
/// announces availability so replicas pull
pub struct MasterFileService {
    node: NodeIdentity,
    store: Arc<FileStore>,
    bus: EventBus,
}

impl MasterFileService {
    pub fn new(node: NodeIdentity, store: Arc<FileStore>, bus: EventBus) -> Self {
        Self { node, store, bus }
    }

    /// Write the uploaded bytes, advance this node Reserved -> Exists,
    /// and publish the availability event
    pub async fn save_content(
        &self,
        owner: i64,
        uuid: &str,
        bytes: &[u8],
    ) -> Result<Entry, DepotError> {
        let entry = self.store.entry(owner, uuid).await?;
        if entry.is_directory() {
            return Err(DepotError::Conflict(format!(
                "entry {} is a directory and carries no content",
                uuid
            )));
        }

        self.store.ensure_parent_dir(&entry.location_path).await?;
        tokio::fs::write(self.store.absolute_path(&entry.location_path), bytes).await?;

        self.store
            .update_location_status(owner, uuid, LocationStatus::Reserved, LocationStatus::Exists)
            .await?;

        let entry = self.store.entry(owner, uuid).await?;
        self.bus.publish(
            FILE_CHANNEL,
            ReplicationEvent {
                uuid: entry.uuid.clone(),
                owner,
                location_path: entry.location_path.clone(),
                locations: entry.locations.clone(),
                origin: self.node.clone(),
                operation: EventOperation::Save,
            },
        );

        info!(owner, uuid, size = bytes.len(), "Stored uploaded content");
        Ok(entry)
    }
}

/// Subscriber side of replication, running on every node.
///
/// Entry events claim planned replicas (Created -> Reserved); file
/// SAVE events pull the bytes from the origin (Reserved -> Exists);
/// DELETE events remove local content. The conditional transition
/// makes all three safe on the leader too: its own locations never
/// match the claimed precondition.
pub struct NodeFileService {
    node: NodeIdentity,
    store: Arc<FileStore>,
    bus: EventBus,
    fetcher: Arc<dyn ContentFetcher>,
    running: Arc<AtomicBool>,
}

impl NodeFileService {
    pub fn new(
        node: NodeIdentity,
        store: Arc<FileStore>,
        bus: EventBus,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        Self {
            node,
            store,
            bus,
            fetcher,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to both channels and start consuming events
    pub fn start(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let service = self.clone();
        let mut entry_events = self.bus.subscribe(ENTRY_CHANNEL);
        tokio::spawn(async move {
            while service.running.load(Ordering::SeqCst) {
                match entry_events.recv().await {
                    Ok(event) => {
                        if let Err(e) = service.handle_entry_event(&event).await {
                            warn!(uuid = %event.uuid, error = %e, "Entry event handling failed");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Entry event subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let service = self.clone();
        let mut file_events = self.bus.subscribe(FILE_CHANNEL);
        tokio::spawn(async move {
            while service.running.load(Ordering::SeqCst) {
                match file_events.recv().await {
                    Ok(event) => {
                        if let Err(e) = service.handle_file_event(&event).await {
                            warn!(uuid = %event.uuid, error = %e, "File event handling failed");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "File event subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// A new entry names this node as a planned replica: claim it
    pub async fn handle_entry_event(&self, event: &ReplicationEvent) -> Result<(), DepotError> {
        if event.operation != EventOperation::Save {
            return Ok(());
        }
        self.store
            .update_location_status(
                event.owner,
                &event.uuid,
                LocationStatus::Created,
                LocationStatus::Reserved,
            )
            .await?;
        Ok(())
    }

    pub async fn handle_file_event(&self, event: &ReplicationEvent) -> Result<(), DepotError> {
        match event.operation {
            EventOperation::Save => self.pull_content(event).await,
            EventOperation::Delete => self.remove_content(event).await,
        }
    }

    /// Content became available on the origin: stream it here, then
    /// advance Reserved -> Exists. On failure the location stays
    /// Reserved; there is no automatic redelivery, a re-announce has to
    /// come from outside.
    async fn pull_content(&self, event: &ReplicationEvent) -> Result<(), DepotError> {
        if event.origin.uid == self.node.uid || event.location_for(&self.node.uid).is_none() {
            return Ok(());
        }

        self.store.ensure_parent_dir(&event.location_path).await?;
        let dest = self.store.absolute_path(&event.location_path);
        let written = self
            .fetcher
            .fetch(&event.origin, event.owner, &event.uuid, &dest)
            .await?;

        self.store
            .update_location_status(
                event.owner,
                &event.uuid,
                LocationStatus::Reserved,
                LocationStatus::Exists,
            )
            .await?;
        info!(
            uuid = %event.uuid,
            origin = %event.origin.uid,
            bytes = written,
            "Replicated content from origin"
        );
        Ok(())
    }

    /// The entry was deleted: drop the local copy. The metadata row is
    /// usually gone already, in which case the status transition is a
    /// no-op and only the file removal matters.
    async fn remove_content(&self, event: &ReplicationEvent) -> Result<(), DepotError> {
        if event.location_for(&self.node.uid).is_none() {
            return Ok(());
        }

        let path = self.store.absolute_path(&event.location_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!(uuid = %event.uuid, path = %path.display(), "Removed local content"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.store
            .update_location_status(
                event.owner,
                &event.uuid,
                LocationStatus::Exists,
                LocationStatus::Deleted,
            )
            .await?;
        Ok(())
    }
}
