//! Registry operations against the shared lease store
//!
//! Membership lives in the `node` hash; liveness and leadership live in
//! separate expiring leases. A node is alive exactly while its
//! `node:<uid>` lease exists, so the member map itself never needs a
//! TTL and a stale row is garbage-collected by whoever wins the GC
//! mutex.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};
use uuid::Uuid;

use depot_common::{DepotError, GC_LOCK_KEY, LEADER_KEY, NODE_MAP_KEY, NodeIdentity};
use depot_store::{LeaseStore, MetadataStore};

const REGISTER_MAX_ATTEMPTS: usize = 16;

/// Lease durations and refresh cadences
///
/// Refresh periods are half the lease they keep alive, so a single
/// missed tick never drops a healthy node.
#[derive(Clone, Debug)]
pub struct RegistryTiming {
    pub member_lease: Duration,
    pub leader_lease: Duration,
    pub refresh_period: Duration,
    pub gc_lock: Duration,
    pub gc_period: Duration,
    pub zone_row_ttl: Duration,
    pub zone_push_period: Duration,
}

impl Default for RegistryTiming {
    fn default() -> Self {
        Self {
            member_lease: Duration::from_secs(1),
            leader_lease: Duration::from_secs(1),
            refresh_period: Duration::from_millis(500),
            gc_lock: Duration::from_secs(5),
            gc_period: Duration::from_secs(5),
            zone_row_ttl: Duration::from_secs(10),
            zone_push_period: Duration::from_secs(5),
        }
    }
}

/// Membership and election operations
#[derive(Clone)]
pub struct RegistryService {
    lease: Arc<dyn LeaseStore>,
    metadata: Arc<dyn MetadataStore>,
    timing: RegistryTiming,
}

impl RegistryService {
    pub fn new(lease: Arc<dyn LeaseStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self::with_timing(lease, metadata, RegistryTiming::default())
    }

    pub fn with_timing(
        lease: Arc<dyn LeaseStore>,
        metadata: Arc<dyn MetadataStore>,
        timing: RegistryTiming,
    ) -> Self {
        Self {
            lease,
            metadata,
            timing,
        }
    }

    pub fn timing(&self) -> &RegistryTiming {
        &self.timing
    }

    /// Register the node in the shared member map.
    ///
    /// The preferred uid is kept when its slot is free; on collision a
    /// fresh uid is generated and the insert retried. Returns the uid
    /// the node actually registered under.
    pub async fn register_node(&self, node: &NodeIdentity) -> Result<String, DepotError> {
        let mut candidate = node.uid.clone();
        for attempt in 0..REGISTER_MAX_ATTEMPTS {
            let mut claimed = node.clone();
            claimed.uid = candidate.clone();
            let value = serde_json::to_string(&claimed)
                .map_err(|e| DepotError::Store(format!("serialize node identity: {}", e)))?;

            if self
                .lease
                .hset_if_absent(NODE_MAP_KEY, &candidate, &value)
                .await?
            {
                info!(uid = %candidate, zone = %claimed.zone, "Registered node");
                return Ok(candidate);
            }

            debug!(uid = %candidate, attempt, "Node uid already taken, retrying");
            candidate = Uuid::new_v4().to_string();
        }
        Err(DepotError::Store(
            "could not claim a node uid in the member map".to_string(),
        ))
    }

    /// Remove this node's rows so a restart can re-register cleanly
    pub async fn deregister_node(&self, uid: &str) -> Result<(), DepotError> {
        self.lease.hdel(NODE_MAP_KEY, &[uid]).await?;
        self.lease
            .delete(&[&format!("node:{}", uid)])
            .await
    }

    /// Refresh the liveness lease; called faster than the lease expires
    pub async fn refresh_alive(&self, uid: &str) -> Result<(), DepotError> {
        self.lease
            .set_with_ttl(&format!("node:{}", uid), "alive", self.timing.member_lease)
            .await
    }

    pub async fn is_alive(&self, uid: &str) -> Result<bool, DepotError> {
        Ok(self.lease.get(&format!("node:{}", uid)).await?.is_some())
    }

    pub async fn check_leader_alive(&self) -> Result<bool, DepotError> {
        Ok(self.lease.get(LEADER_KEY).await?.is_some())
    }

    pub async fn leader_uid(&self) -> Result<Option<String>, DepotError> {
        self.lease.get(LEADER_KEY).await
    }

    /// Try to take the leader lease; only one concurrent caller wins
    pub async fn elect_leader(&self, uid: &str) -> Result<bool, DepotError> {
        let won = self
            .lease
            .insert_if_absent(LEADER_KEY, uid, self.timing.leader_lease)
            .await?;
        if won {
            info!(uid = %uid, "Won leader election");
        }
        Ok(won)
    }

    pub async fn refresh_leader(&self, uid: &str) -> Result<(), DepotError> {
        self.lease
            .set_with_ttl(LEADER_KEY, uid, self.timing.leader_lease)
            .await
    }

    /// Drop dead members from the map; a cluster-wide mutex keeps
    /// concurrent sweepers from doubling the work. Returns the uids
    /// removed, empty when the mutex was held elsewhere.
    pub async fn sweep_node_map(&self) -> Result<Vec<String>, DepotError> {
        if !self
            .lease
            .insert_if_absent(GC_LOCK_KEY, "locked", self.timing.gc_lock)
            .await?
        {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for uid in self.lease.hkeys(NODE_MAP_KEY).await? {
            if !self.is_alive(&uid).await? {
                self.lease.hdel(NODE_MAP_KEY, &[&uid]).await?;
                warn!(uid = %uid, "Swept dead node from member map");
                removed.push(uid);
            }
        }
        Ok(removed)
    }

    /// Snapshot this zone's live member list into the cross-zone
    /// directory, one TTL'd row per member. The member map registered
    /// the caller as a follower, so its row is replaced with the
    /// current (promoted) identity. Returns how many rows were pushed.
    pub async fn publish_zone_directory(
        &self,
        leader: &NodeIdentity,
    ) -> Result<usize, DepotError> {
        let mut members = self.local_nodes().await?;
        for member in &mut members {
            if member.uid == leader.uid {
                *member = leader.clone();
            }
        }
        for member in &members {
            self.metadata
                .upsert_zone_node(member, self.timing.zone_row_ttl)
                .await?;
        }
        Ok(members.len())
    }

    /// Registered members of this zone whose liveness lease is present
    pub async fn local_nodes(&self) -> Result<Vec<NodeIdentity>, DepotError> {
        let mut nodes = Vec::new();
        for (uid, raw) in self.lease.hgetall(NODE_MAP_KEY).await? {
            if !self.is_alive(&uid).await? {
                continue;
            }
            match serde_json::from_str::<NodeIdentity>(&raw) {
                Ok(node) => nodes.push(node),
                Err(e) => warn!(uid = %uid, error = %e, "Skipping unparsable member row"),
            }
        }
        Ok(nodes)
    }

    /// All nodes in the cross-zone directory, falling back to the local
    /// zone roster while the directory is still empty
    pub async fn global_nodes(&self) -> Result<Vec<NodeIdentity>, DepotError> {
        let nodes = self.metadata.zone_nodes().await?;
        if nodes.is_empty() {
            return self.local_nodes().await;
        }
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_common::NodeRole;
    use depot_store::{MemoryLeaseStore, MemoryMetadataStore};

    fn test_registry() -> RegistryService {
        RegistryService::new(
            Arc::new(MemoryLeaseStore::default()),
            Arc::new(MemoryMetadataStore::new()),
        )
    }

    fn test_registry_with(timing: RegistryTiming) -> RegistryService {
        RegistryService::with_timing(
            Arc::new(MemoryLeaseStore::default()),
            Arc::new(MemoryMetadataStore::new()),
            timing,
        )
    }

    fn test_node(uid: &str) -> NodeIdentity {
        NodeIdentity {
            uid: uid.to_string(),
            address: "10.0.0.1".to_string(),
            port: 8080,
            protocol: "http".to_string(),
            zone: "alpha".to_string(),
            role: NodeRole::Follower,
        }
    }

    #[tokio::test]
    async fn test_register_keeps_free_uid() {
        let registry = test_registry();
        let uid = registry.register_node(&test_node("n1")).await.unwrap();
        assert_eq!(uid, "n1");
    }

    #[tokio::test]
    async fn test_register_rewrites_taken_uid() {
        let registry = test_registry();
        registry.register_node(&test_node("n1")).await.unwrap();

        let uid = registry.register_node(&test_node("n1")).await.unwrap();
        assert_ne!(uid, "n1");

        // Both rows exist in the member map
        registry.refresh_alive("n1").await.unwrap();
        registry.refresh_alive(&uid).await.unwrap();
        assert_eq!(registry.local_nodes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_alive_follows_lease() {
        let registry = test_registry_with(RegistryTiming {
            member_lease: Duration::ZERO,
            ..RegistryTiming::default()
        });
        registry.register_node(&test_node("n1")).await.unwrap();
        registry.refresh_alive("n1").await.unwrap();
        assert!(!registry.is_alive("n1").await.unwrap());
        assert!(registry.local_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_elect_leader_at_most_one() {
        let registry = test_registry();
        assert!(registry.elect_leader("n1").await.unwrap());
        assert!(!registry.elect_leader("n2").await.unwrap());
        assert_eq!(registry.leader_uid().await.unwrap().as_deref(), Some("n1"));
        assert!(registry.check_leader_alive().await.unwrap());
    }

    #[tokio::test]
    async fn test_leader_succession_after_expiry() {
        let registry = test_registry_with(RegistryTiming {
            leader_lease: Duration::ZERO,
            ..RegistryTiming::default()
        });
        assert!(registry.elect_leader("n1").await.unwrap());
        assert!(!registry.check_leader_alive().await.unwrap());
        assert!(registry.elect_leader("n2").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_removes_dead_members() {
        let registry = test_registry();
        registry.register_node(&test_node("n1")).await.unwrap();
        registry.register_node(&test_node("n2")).await.unwrap();
        registry.refresh_alive("n1").await.unwrap();
        // n2 never refreshes its lease

        let removed = registry.sweep_node_map().await.unwrap();
        assert_eq!(removed, vec!["n2"]);

        registry.refresh_alive("n1").await.unwrap();
        let nodes = registry.local_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].uid, "n1");
    }

    #[tokio::test]
    async fn test_sweep_mutex_excludes_second_sweeper() {
        let registry = test_registry();
        registry.register_node(&test_node("n1")).await.unwrap();

        assert!(registry.sweep_node_map().await.is_ok());
        // Second pass inside the mutex window does nothing
        assert!(registry.sweep_node_map().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_global_falls_back_to_local() {
        let registry = test_registry();
        registry.register_node(&test_node("n1")).await.unwrap();
        registry.refresh_alive("n1").await.unwrap();

        let global = registry.global_nodes().await.unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].uid, "n1");
    }

    #[tokio::test]
    async fn test_global_prefers_zone_directory() {
        // Two zones share the cross-zone metadata table but not a
        // lease store
        let metadata = Arc::new(MemoryMetadataStore::new());
        let alpha = RegistryService::new(
            Arc::new(MemoryLeaseStore::default()),
            metadata.clone(),
        );
        let beta = RegistryService::new(Arc::new(MemoryLeaseStore::default()), metadata);

        let mut remote = test_node("r1");
        remote.zone = "beta".to_string();
        beta.register_node(&remote).await.unwrap();
        beta.refresh_alive("r1").await.unwrap();
        assert_eq!(beta.publish_zone_directory(&remote).await.unwrap(), 1);

        alpha.register_node(&test_node("n1")).await.unwrap();
        alpha.refresh_alive("n1").await.unwrap();

        let global = alpha.global_nodes().await.unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].zone, "beta");
    }

    #[tokio::test]
    async fn test_directory_push_covers_live_members() {
        let registry = test_registry();
        for uid in ["m1", "f1"] {
            registry.register_node(&test_node(uid)).await.unwrap();
            registry.refresh_alive(uid).await.unwrap();
        }
        // f2 is registered but its lease has lapsed
        registry.register_node(&test_node("f2")).await.unwrap();

        let mut leader = test_node("m1");
        leader.role = NodeRole::Leader;
        assert_eq!(registry.publish_zone_directory(&leader).await.unwrap(), 2);

        let mut uids: Vec<String> = registry
            .global_nodes()
            .await
            .unwrap()
            .into_iter()
            .map(|node| node.uid)
            .collect();
        uids.sort();
        assert_eq!(uids, vec!["f1", "m1"]);

        // The leader's directory row carries its promoted role
        let leader_row = registry
            .global_nodes()
            .await
            .unwrap()
            .into_iter()
            .find(|node| node.uid == "m1")
            .unwrap();
        assert_eq!(leader_row.role, NodeRole::Leader);
    }

    #[tokio::test]
    async fn test_deregister_removes_rows() {
        let registry = test_registry();
        registry.register_node(&test_node("n1")).await.unwrap();
        registry.refresh_alive("n1").await.unwrap();

        registry.deregister_node("n1").await.unwrap();
        assert!(!registry.is_alive("n1").await.unwrap());
        assert!(registry.local_nodes().await.unwrap().is_empty());
        // The uid is free again
        assert_eq!(
            registry.register_node(&test_node("n1")).await.unwrap(),
            "n1"
        );
    }
}
