// Moneta Core - Execution engine of a gas-accounted, content-addressed ledger
// Principle: Requests in, verified responses out, nothing else

pub mod builder;
pub mod gas;
pub mod loader;
pub mod node;
pub mod runtime;
pub mod store;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod tests;

pub use node::config::NodeConfig;
pub use node::coordinator::Node;
pub use types::*;
