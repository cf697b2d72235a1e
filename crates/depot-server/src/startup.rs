//! Process bootstrap
//!
//! Wires the stores, services, and background workers together, then
//! hands the shared state to the HTTP server. The node registers
//! before serving so the assigned uid is known to every service from
//! the start.

use std::{path::Path, sync::Arc};

use actix_web::{App, HttpServer, web};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use depot_registry::{NodeWorker, RegistryService};
use depot_replication::{
    FileStore, GroupService, HttpContentFetcher, MasterEntryService, MasterFileService,
    NodeEntryService, NodeFileService, ReadRouter, UserService,
};
use depot_store::{EventBus, LeaseStore, MemoryLeaseStore, MemoryMetadataStore, MetadataStore};

use crate::api;
use crate::config::NodeConfig;
use crate::state::AppState;

pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// A booted node: shared handler state plus the background halves that
/// need an explicit stop
pub struct Runtime {
    pub state: Arc<AppState>,
    subscriber: Arc<NodeFileService>,
}

impl Runtime {
    pub fn shutdown(&self) {
        self.state.worker.stop();
        self.subscriber.stop();
    }
}

/// Register the node, start its background tasks, and assemble the
/// handler state. The uid assigned at registration is persisted back
/// into the identity file.
pub async fn bootstrap(config: &mut NodeConfig, config_path: &Path) -> anyhow::Result<Runtime> {
    let lease: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
    let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
    let bus = EventBus::new();
    let registry = Arc::new(RegistryService::new(lease, metadata.clone()));

    let worker = Arc::new(NodeWorker::new(config.identity(), registry.clone()));
    worker.on_leader_start(Arc::new(|node| {
        info!(uid = %node.uid, zone = %node.zone, "Metadata writes and uploads now accepted here");
    }));

    let uid = worker.start().await?;
    config.rewrite_uid(config_path, &uid).await?;
    let node = worker.current_identity().await;

    let store = Arc::new(FileStore::new(&config.data_path, &uid, metadata.clone()));
    store.init().await?;

    let groups = Arc::new(GroupService::new(metadata.clone()));
    let users = Arc::new(UserService::new(metadata.clone(), groups.clone()));
    let master_entries = Arc::new(MasterEntryService::new(
        node.clone(),
        metadata.clone(),
        registry.clone(),
        users.clone(),
        groups.clone(),
        bus.clone(),
    ));
    let node_entries = Arc::new(NodeEntryService::new(metadata.clone()));
    let master_files = Arc::new(MasterFileService::new(node.clone(), store.clone(), bus.clone()));
    let router = Arc::new(ReadRouter::new(registry.clone()));

    let subscriber = Arc::new(NodeFileService::new(
        node,
        store.clone(),
        bus,
        Arc::new(HttpContentFetcher::new()),
    ));
    subscriber.start();

    let state = Arc::new(AppState::new(
        worker,
        registry,
        store,
        router,
        users,
        groups,
        master_files,
        master_entries,
        node_entries,
    ));
    Ok(Runtime { state, subscriber })
}

pub async fn run_server(state: Arc<AppState>, bind_ip: &str, port: u16) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(state.clone()))
            .configure(api::configure)
    })
    .bind((bind_ip, port))?
    .run()
    .await
}
