//! Depot Replication - entry lifecycle and content fan-out
//!
//! The leader owns metadata writes: it validates an entry request,
//! computes replica placement, persists the row, and announces it on
//! the shared event channels. Every node (the leader included) runs
//! the follower side: subscribers that claim planned replicas, pull
//! content from the origin node, and apply delete events. All replica
//! progress flows through one conditional transition on the entry's
//! location set, which makes duplicated or reordered events harmless.

pub mod account;
pub mod entry;
pub mod file;
pub mod router;

pub use account::{GroupService, UserService};
pub use entry::{EntryRequest, EntryService, MasterEntryService, NodeEntryService};
pub use file::{
    ContentFetcher, FileStore, HttpContentFetcher, MasterFileService, NodeFileService,
};
pub use router::ReadRouter;
