// Node - Coordination, caches et configuration

pub mod caches;
pub mod config;
pub mod coordinator;

pub use caches::{ConsensusParams, NodeCaches};
pub use config::NodeConfig;
pub use coordinator::{Node, NodeError};
