//! Depot node server
//!
//! One binary per node. Boot order: load the identity file, register in
//! the member map (persisting the assigned uid back), start the event
//! subscribers and the lifecycle worker, then serve the HTTP surface.
//! Whether a request that writes metadata is accepted or rejected is
//! decided per request from the worker's current role, so a promotion
//! needs no restart.

pub mod api;
pub mod config;
pub mod startup;
pub mod state;

pub use config::NodeConfig;
pub use state::AppState;
