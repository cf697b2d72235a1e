//! Redirect-based read routing
//!
//! The router never moves bytes. It resolves an entry's replica set
//! against the cross-zone roster (local zone while the directory is
//! empty), keeps only live replicas whose content is fully written,
//! and points the client at one of them.

use std::sync::Arc;

use rand::seq::IndexedRandom;

use depot_common::{DepotError, Entry, Location, LocationStatus, NodeIdentity};
use depot_registry::RegistryService;

pub struct ReadRouter {
    registry: Arc<RegistryService>,
}

impl ReadRouter {
    pub fn new(registry: Arc<RegistryService>) -> Self {
        Self { registry }
    }

    /// Pick a live replica of the entry, uniformly at random.
    ///
    /// Only `Exists` locations are candidates: a `Created` or
    /// `Reserved` replica does not hold the bytes yet, so routing a
    /// client there would 404.
    pub async fn pick_replica(&self, entry: &Entry) -> Result<NodeIdentity, DepotError> {
        let roster = self.registry.global_nodes().await?;
        let declared: Vec<Location> = entry
            .locations
            .iter()
            .filter_map(|raw| Location::decode(raw))
            .filter(|location| location.status != LocationStatus::Deleted)
            .collect();

        let servable: Vec<&NodeIdentity> = declared
            .iter()
            .filter(|location| location.status == LocationStatus::Exists)
            .filter_map(|location| roster.iter().find(|node| node.uid == location.uid))
            .collect();

        match servable.choose(&mut rand::rng()) {
            Some(node) => Ok((*node).clone()),
            None => Err(DepotError::NodeUnavailable(
                declared.into_iter().map(|location| location.uid).collect(),
            )),
        }
    }

    /// Redirect URL for the entry's content on a chosen live replica
    pub async fn redirect_url(&self, entry: &Entry) -> Result<String, DepotError> {
        let node = self.pick_replica(entry).await?;
        Ok(format!("{}/data/{}", node.base_url(), entry.location_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_common::{EntryType, NodeRole};
    use depot_registry::RegistryTiming;
    use depot_store::{LeaseStore, MemoryLeaseStore, MemoryMetadataStore, MetadataStore};

    fn test_node(uid: &str) -> NodeIdentity {
        NodeIdentity {
            uid: uid.to_string(),
            address: format!("10.0.0.{}", uid.len()),
            port: 8080,
            protocol: "http".to_string(),
            zone: "alpha".to_string(),
            role: NodeRole::Follower,
        }
    }

    fn test_entry(locations: Vec<&str>) -> Entry {
        Entry {
            uuid: "e1".to_string(),
            name: "a.txt".to_string(),
            entry_type: EntryType::File,
            parent: Some("root".to_string()),
            children: None,
            path: "/docs/a.txt".to_string(),
            owner: 42,
            group: 1,
            permission: "644".to_string(),
            share: None,
            created: 0,
            modified: 0,
            size: 0,
            locations: locations.into_iter().map(String::from).collect(),
            location_path: "42/docs/a.txt".to_string(),
        }
    }

    async fn router_with_alive(uids: &[&str]) -> ReadRouter {
        let lease: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::default());
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let registry = Arc::new(RegistryService::with_timing(
            lease,
            metadata,
            RegistryTiming::default(),
        ));
        for uid in uids {
            registry.register_node(&test_node(uid)).await.unwrap();
            registry.refresh_alive(uid).await.unwrap();
        }
        ReadRouter::new(registry)
    }

    #[tokio::test]
    async fn test_routes_to_the_only_alive_replica() {
        // Origin a1 is dead, replica b2 is alive
        let router = router_with_alive(&["b2"]).await;
        let entry = test_entry(vec!["a1:::2", "b2:::2"]);

        let node = router.pick_replica(&entry).await.unwrap();
        assert_eq!(node.uid, "b2");
    }

    #[tokio::test]
    async fn test_no_alive_replica_is_unavailable() {
        let router = router_with_alive(&[]).await;
        let entry = test_entry(vec!["a1:::2", "b2:::2"]);

        let err = router.pick_replica(&entry).await.unwrap_err();
        match err {
            DepotError::NodeUnavailable(uids) => {
                assert_eq!(uids, vec!["a1".to_string(), "b2".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_deleted_replicas_are_not_candidates() {
        let router = router_with_alive(&["a1", "b2"]).await;
        let entry = test_entry(vec!["a1:::-1", "b2:::2"]);

        let node = router.pick_replica(&entry).await.unwrap();
        assert_eq!(node.uid, "b2");
    }

    #[tokio::test]
    async fn test_mid_transfer_replicas_are_not_candidates() {
        // a1 is alive but still pulling; only b2 can serve the bytes
        let router = router_with_alive(&["a1", "b2"]).await;
        let entry = test_entry(vec!["a1:::1", "b2:::2"]);

        for _ in 0..8 {
            let node = router.pick_replica(&entry).await.unwrap();
            assert_eq!(node.uid, "b2");
        }
    }

    #[tokio::test]
    async fn test_no_servable_replica_is_unavailable() {
        // Both alive, neither has finished a transfer
        let router = router_with_alive(&["a1", "b2"]).await;
        let entry = test_entry(vec!["a1:::1", "b2:::0"]);

        let err = router.pick_replica(&entry).await.unwrap_err();
        match err {
            DepotError::NodeUnavailable(uids) => {
                assert_eq!(uids, vec!["a1".to_string(), "b2".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_redirect_url_shape() {
        let router = router_with_alive(&["b2"]).await;
        let entry = test_entry(vec!["b2:::2"]);

        let url = router.redirect_url(&entry).await.unwrap();
        assert_eq!(url, "http://10.0.0.2:8080/data/42/docs/a.txt");
    }

    #[tokio::test]
    async fn test_alive_replica_always_found_among_many() {
        let router = router_with_alive(&["a1", "b2"]).await;
        let entry = test_entry(vec!["a1:::2", "b2:::2"]);

        for _ in 0..8 {
            let node = router.pick_replica(&entry).await.unwrap();
            assert!(node.uid == "a1" || node.uid == "b2");
        }
    }
}
