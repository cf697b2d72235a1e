//! Depot Common - shared types, errors, and utilities
//!
//! This crate provides the foundational types used across all Depot components:
//! - The domain error taxonomy
//! - Node, entry, and replication-event models
//! - Location status encoding
//! - Utility functions

pub mod error;
pub mod model;
pub mod utils;

// Re-exports for convenience
pub use error::DepotError;
pub use model::{
    Entry, EntryType, EventOperation, Group, Location, LocationStatus, NodeIdentity, NodeRole,
    ReplicationEvent, User,
};
pub use utils::local_ip;

/// Delimiter between node uid and status in an encoded location string
pub const LOCATION_DELIMITER: &str = ":::";

/// Pub/sub channel carrying entry creation/deletion events
pub const ENTRY_CHANNEL: &str = "entry:global";

/// Pub/sub channel carrying content SAVE/DELETE events
pub const FILE_CHANNEL: &str = "file:global";

/// Shared member map key in the lease store
pub const NODE_MAP_KEY: &str = "node";

/// Leader lease key in the lease store
pub const LEADER_KEY: &str = "node:leader";

/// Mutual-exclusion key guarding node-map GC passes
pub const GC_LOCK_KEY: &str = "node:gc";
