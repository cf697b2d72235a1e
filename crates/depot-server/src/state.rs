//! Shared handler state

use std::sync::Arc;

use depot_registry::{NodeWorker, RegistryService};
use depot_replication::{
    EntryService, FileStore, GroupService, MasterEntryService, MasterFileService, NodeEntryService,
    ReadRouter, UserService,
};

/// Everything the HTTP handlers reach for.
///
/// Both entry service implementations are always constructed; which one
/// a request sees follows the worker's role at that moment.
pub struct AppState {
    pub worker: Arc<NodeWorker>,
    pub registry: Arc<RegistryService>,
    pub store: Arc<FileStore>,
    pub router: Arc<ReadRouter>,
    pub users: Arc<UserService>,
    pub groups: Arc<GroupService>,
    pub master_files: Arc<MasterFileService>,
    master_entries: Arc<MasterEntryService>,
    node_entries: Arc<NodeEntryService>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker: Arc<NodeWorker>,
        registry: Arc<RegistryService>,
        store: Arc<FileStore>,
        router: Arc<ReadRouter>,
        users: Arc<UserService>,
        groups: Arc<GroupService>,
        master_files: Arc<MasterFileService>,
        master_entries: Arc<MasterEntryService>,
        node_entries: Arc<NodeEntryService>,
    ) -> Self {
        Self {
            worker,
            registry,
            store,
            router,
            users,
            groups,
            master_files,
            master_entries,
            node_entries,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.worker.is_leader()
    }

    /// Entry service for the node's current role
    pub fn entries(&self) -> Arc<dyn EntryService> {
        if self.worker.is_leader() {
            self.master_entries.clone()
        } else {
            self.node_entries.clone()
        }
    }
}
