//! Depot Store - coordination and metadata primitives
//!
//! Three building blocks the rest of the system is written against:
//! - [`LeaseStore`]: atomic set-if-absent with expiry, plain get/set,
//!   and hash-map operations; the only cross-node synchronization
//!   device in the design.
//! - [`MetadataStore`]: owner-scoped entry tables with a location set
//!   column supporting conditional add/remove batches, plus the
//!   TTL'd cross-zone node directory.
//! - [`EventBus`]: named at-least-once fan-out channels carrying
//!   replication events.
//!
//! Each trait ships with an in-memory implementation used in tests and
//! single-process deployments; a networked backend only has to satisfy
//! the same contracts.

pub mod bus;
pub mod lease;
pub mod metadata;

pub use bus::EventBus;
pub use lease::{LeaseStore, MemoryLeaseStore};
pub use metadata::{MemoryMetadataStore, MetadataStore};
