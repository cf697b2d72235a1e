//! Depot Registry - cluster membership and leader election
//!
//! Every coordination decision here reduces to one primitive: an
//! atomic set-if-absent with expiry in the shared lease store. A node
//! holds its membership by refreshing a short lease faster than it
//! expires; the leader holds its role the same way. There is no
//! consensus protocol and no voting, only lease acquisition.

pub mod service;
pub mod worker;

pub use service::{RegistryService, RegistryTiming};
pub use worker::NodeWorker;
