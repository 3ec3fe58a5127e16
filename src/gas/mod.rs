// Gas - Cost model for transaction execution
// Principle: Every resource has a price, fixed by the node

pub mod meter;

pub use meter::{GasError, GasMeter};

use crate::types::Gas;

/// Default costs of the standard model
pub mod costs {
    /// Base CPU cost charged to every non-initial transaction
    pub const CPU_BASE_TRANSACTION: u64 = 10;

    /// Storage cost of one serialized byte
    pub const STORAGE_PER_BYTE: u64 = 1;

    /// Base CPU cost of installing a jar
    pub const CPU_JAR_INSTALL_BASE: u64 = 50;

    /// Divisor applied to the jar length for the CPU cost of installation
    pub const CPU_JAR_INSTALL_PER_BYTE_DIVISOR: u64 = 400;

    /// Divisor applied to the jar length for the RAM cost of installation
    pub const RAM_JAR_INSTALL_PER_BYTE_DIVISOR: u64 = 40;

    /// Divisor applied to the jar length for the CPU cost of loading it
    /// into a class space
    pub const CPU_JAR_LOAD_PER_BYTE_DIVISOR: u64 = 1_000;

    /// Divisor applied to the jar length for the RAM cost of loading it
    pub const RAM_JAR_LOAD_PER_BYTE_DIVISOR: u64 = 200;
}

/// Pure function from operation size and kind to units of gas.
/// Supplied to the engine, consumed everywhere gas is charged.
pub trait GasCostModel: Send + Sync {
    /// CPU cost charged to every non-initial transaction, before anything runs
    fn cpu_base_transaction_cost(&self) -> Gas;

    /// Storage cost of the given number of serialized bytes
    fn storage_cost_of_bytes(&self, length: u64) -> Gas;

    /// CPU cost of verifying and installing a jar of the given length
    fn cpu_cost_for_installing_jar(&self, length: u64) -> Gas;

    /// RAM cost of verifying and installing a jar of the given length
    fn ram_cost_for_installing_jar(&self, length: u64) -> Gas;

    /// CPU cost of having loaded a jar of the given length into the
    /// class space of a transaction
    fn cpu_cost_for_loading_jar(&self, length: u64) -> Gas;

    /// RAM cost of having loaded a jar of the given length
    fn ram_cost_for_loading_jar(&self, length: u64) -> Gas;
}

/// The standard cost model, used by default by every node
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardGasCostModel;

impl GasCostModel for StandardGasCostModel {
    fn cpu_base_transaction_cost(&self) -> Gas {
        costs::CPU_BASE_TRANSACTION
    }

    fn storage_cost_of_bytes(&self, length: u64) -> Gas {
        length.saturating_mul(costs::STORAGE_PER_BYTE)
    }

    fn cpu_cost_for_installing_jar(&self, length: u64) -> Gas {
        costs::CPU_JAR_INSTALL_BASE + length / costs::CPU_JAR_INSTALL_PER_BYTE_DIVISOR
    }

    fn ram_cost_for_installing_jar(&self, length: u64) -> Gas {
        length / costs::RAM_JAR_INSTALL_PER_BYTE_DIVISOR
    }

    fn cpu_cost_for_loading_jar(&self, length: u64) -> Gas {
        length / costs::CPU_JAR_LOAD_PER_BYTE_DIVISOR
    }

    fn ram_cost_for_loading_jar(&self, length: u64) -> Gas {
        length / costs::RAM_JAR_LOAD_PER_BYTE_DIVISOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_costs_grow_with_size() {
        let model = StandardGasCostModel;
        assert!(model.storage_cost_of_bytes(100) < model.storage_cost_of_bytes(1_000));
        assert!(
            model.cpu_cost_for_installing_jar(10_000) > model.cpu_cost_for_loading_jar(10_000)
        );
    }
}
