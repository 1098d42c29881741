//! Edgestore - Multi-tenant graph data service
//!
//! Persists entities (typed nodes with a JSON payload) and associations
//! (typed, directed edges between entities) via event sourcing, serves
//! reads through a write-behind cache, and exposes a REST interface scoped
//! by a per-request tenant header.

pub mod association;
pub mod cache;
pub mod config;
pub mod entity;
pub mod errors;
pub mod eventstore;
pub mod model;
pub mod server;
pub mod version;
pub mod worker;

// Re-export common types for library usage
pub use config::Config;
pub use errors::{Error, Kind, Result};
pub use model::{Data, Id, Version};
