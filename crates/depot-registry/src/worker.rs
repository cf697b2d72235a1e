//! Per-node lifecycle worker
//!
//! Owns the node identity, keeps its liveness lease refreshed, and
//! drives the follower-to-leader promotion. A follower polls the
//! leader lease every refresh tick and tries to claim it the moment it
//! lapses; the winner switches role, fires the leader-start hook once,
//! and takes over the periodic leader duties (lease refresh, member
//! map GC, cross-zone directory push).
//!
//! Every periodic task failure is logged and retried on the next tick;
//! a flaky store round-trip never takes the node down.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::RwLock;
use tracing::{info, warn};

use depot_common::{DepotError, NodeIdentity, NodeRole};

use crate::service::RegistryService;

type LeaderStartHook = Arc<dyn Fn(NodeIdentity) + Send + Sync>;

pub struct NodeWorker {
    identity: Arc<RwLock<NodeIdentity>>,
    registry: Arc<RegistryService>,
    is_leader: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    leader_hook: Arc<std::sync::RwLock<Option<LeaderStartHook>>>,
}

impl NodeWorker {
    pub fn new(identity: NodeIdentity, registry: Arc<RegistryService>) -> Self {
        Self {
            identity: Arc::new(RwLock::new(identity)),
            registry,
            is_leader: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            leader_hook: Arc::new(std::sync::RwLock::new(None)),
        }
    }

    /// Register a hook fired exactly once per promotion, after the
    /// role switch is visible
    pub fn on_leader_start(&self, hook: LeaderStartHook) {
        let mut guard = self
            .leader_hook
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *guard = Some(hook);
    }

    pub async fn current_identity(&self) -> NodeIdentity {
        self.identity.read().await.clone()
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &Arc<RegistryService> {
        &self.registry
    }

    /// Register in the member map and start the background tasks.
    /// Returns the uid the node ended up registered under.
    pub async fn start(&self) -> Result<String, DepotError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(self.identity.read().await.uid.clone());
        }

        let uid = {
            let mut identity = self.identity.write().await;
            let uid = self.registry.register_node(&identity).await?;
            identity.uid = uid.clone();
            uid
        };
        self.registry.refresh_alive(&uid).await?;

        self.spawn_refresh_task(uid.clone());
        self.spawn_election_task(uid.clone());
        self.spawn_leader_duty_task();

        info!(uid = %uid, "Node worker started");
        Ok(uid)
    }

    /// Stop refreshing; the node's leases lapse on their own
    pub fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Node worker stopped");
        }
    }

    fn spawn_refresh_task(&self, uid: String) {
        let registry = self.registry.clone();
        let running = self.running.clone();
        let period = registry.timing().refresh_period;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                if let Err(e) = registry.refresh_alive(&uid).await {
                    warn!(uid = %uid, error = %e, "Failed to refresh liveness lease");
                }
            }
        });
    }

    fn spawn_election_task(&self, uid: String) {
        let registry = self.registry.clone();
        let running = self.running.clone();
        let is_leader = self.is_leader.clone();
        let identity = self.identity.clone();
        let leader_hook = self.leader_hook.clone();
        let period = registry.timing().refresh_period;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            while running.load(Ordering::SeqCst) {
                interval.tick().await;

                if is_leader.load(Ordering::SeqCst) {
                    if let Err(e) = registry.refresh_leader(&uid).await {
                        warn!(uid = %uid, error = %e, "Failed to refresh leader lease");
                    }
                    continue;
                }

                let elected = match registry.check_leader_alive().await {
                    Ok(true) => false,
                    Ok(false) => registry.elect_leader(&uid).await.unwrap_or_else(|e| {
                        warn!(uid = %uid, error = %e, "Leader election attempt failed");
                        false
                    }),
                    Err(e) => {
                        warn!(uid = %uid, error = %e, "Could not read leader lease");
                        false
                    }
                };

                if elected {
                    let promoted = {
                        let mut identity = identity.write().await;
                        identity.role = NodeRole::Leader;
                        identity.clone()
                    };
                    is_leader.store(true, Ordering::SeqCst);
                    info!(uid = %uid, "Promoted to leader");

                    let hook = leader_hook
                        .read()
                        .unwrap_or_else(|e| e.into_inner())
                        .clone();
                    if let Some(hook) = hook {
                        hook(promoted);
                    }
                }
            }
        });
    }

    fn spawn_leader_duty_task(&self) {
        let registry = self.registry.clone();
        let running = self.running.clone();
        let is_leader = self.is_leader.clone();
        let identity = self.identity.clone();
        let period = registry.timing().gc_period;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !is_leader.load(Ordering::SeqCst) {
                    continue;
                }

                if let Err(e) = registry.sweep_node_map().await {
                    warn!(error = %e, "Member map sweep failed");
                }

                let node = identity.read().await.clone();
                if let Err(e) = registry.publish_zone_directory(&node).await {
                    warn!(error = %e, "Cross-zone directory push failed");
                }
            }
        });
    }
}
