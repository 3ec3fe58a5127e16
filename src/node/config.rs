// Node Configuration - Local parameters of one node
// Principle: Local knobs here, network-wide rules in the consensus

use crate::types::Gas;
use std::path::PathBuf;

/// Configuration of a node. These parameters are local to the node and can
/// differ between nodes of the same network, unlike [`super::caches::ConsensusParams`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// The directory where the data of the node is persisted
    pub dir: PathBuf,

    /// Delete and recreate the data directory when the node starts.
    /// Set to false to recycle the store of a previous run.
    pub delete_dir_on_open: bool,

    /// Maximum number of polling attempts when waiting for a response
    pub max_polling_attempts: u32,

    /// Delay of the first polling attempt, in milliseconds; it increases
    /// by 10% at each subsequent attempt
    pub polling_delay_ms: u64,

    /// Size of the request cache
    pub request_cache_size: usize,

    /// Size of the response cache
    pub response_cache_size: usize,

    /// Gas ceiling for view transactions, which override whatever the
    /// consensus allows for normal transactions
    pub max_gas_per_view_transaction: Gas,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("chain"),
            delete_dir_on_open: true,
            max_polling_attempts: 60,
            polling_delay_ms: 10,
            request_cache_size: 1_000,
            response_cache_size: 1_000,
            max_gas_per_view_transaction: 1_000_000,
        }
    }
}

impl NodeConfig {
    /// Configuration with data under the given directory
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}
