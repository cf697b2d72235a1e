//! Node configuration
//!
//! Settings layer in the usual order: built-in defaults, then the JSON
//! identity file, then `DEPOT_NODE_*` environment variables. The identity
//! file is strict about its keys so a typo fails the boot instead of
//! silently falling back to a default. The uid is written back after
//! the first registration, so a restarted node keeps its place in the
//! member map.

use std::path::Path;

use serde::{Deserialize, Serialize};

use depot_common::{DepotError, NodeIdentity, NodeRole, local_ip};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Assigned on first registration and persisted
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_zone")]
    pub zone: String,
    #[serde(default = "default_data_path")]
    pub data_path: String,
}

fn default_bind_ip() -> String {
    local_ip()
}

fn default_port() -> u16 {
    8080
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_zone() -> String {
    "default".to_string()
}

fn default_data_path() -> String {
    "data".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            uid: None,
            bind_ip: default_bind_ip(),
            port: default_port(),
            protocol: default_protocol(),
            zone: default_zone(),
            data_path: default_data_path(),
        }
    }
}

impl NodeConfig {
    /// Load from the identity file (optional) and `DEPOT_NODE_*` variables
    pub fn load(path: &Path) -> Result<Self, DepotError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json).required(false))
            .add_source(config::Environment::with_prefix("DEPOT_NODE"))
            .build()
            .map_err(|e| DepotError::Config(e.to_string()))?;

        let node_config: NodeConfig = settings
            .try_deserialize()
            .map_err(|e| DepotError::Config(e.to_string()))?;
        node_config.validate()?;
        Ok(node_config)
    }

    fn validate(&self) -> Result<(), DepotError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(DepotError::Config(format!(
                "protocol must be http or https, got {}",
                self.protocol
            )));
        }
        if self.port == 0 {
            return Err(DepotError::Config("port must be non-zero".to_string()));
        }
        if self.zone.is_empty() {
            return Err(DepotError::Config("zone must not be empty".to_string()));
        }
        Ok(())
    }

    /// Persist the registered uid back into the identity file
    pub async fn rewrite_uid(&mut self, path: &Path, uid: &str) -> Result<(), DepotError> {
        self.uid = Some(uid.to_string());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| DepotError::Config(e.to_string()))?;
        tokio::fs::write(path, body).await?;
        Ok(())
    }

    /// Identity to register under; every node boots as a follower
    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            uid: self.uid.clone().unwrap_or_default(),
            address: self.bind_ip.clone(),
            port: self.port,
            protocol: self.protocol.clone(),
            zone: self.zone.clone(),
            role: NodeRole::Follower,
        }
    }
}
